//! 发送请求与完成令牌的测试数据构建器

use sms_domain::{CompletionReceiver, CompletionToken, SendRequest};

/// 创建 n 个完成令牌及其接收端
pub fn token_pairs(count: usize) -> (Vec<CompletionToken>, Vec<CompletionReceiver>) {
    (0..count).map(|_| CompletionToken::channel()).unzip()
}

/// 测试用 SendRequest 构建器
pub struct SendRequestBuilder {
    request: SendRequest,
}

impl SendRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: SendRequest::text("10086", "hello"),
        }
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.request.destination = destination.to_string();
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.request.payload = sms_domain::Payload::Text(text.to_string());
        self
    }

    /// 生成指定长度的纯 ASCII 文本
    pub fn with_ascii_len(self, len: usize) -> Self {
        let text: String = "abcdefghij".chars().cycle().take(len).collect();
        self.with_text(&text)
    }

    pub fn with_data(mut self, bytes: Vec<u8>, destination_port: u16) -> Self {
        self.request.payload = sms_domain::Payload::Data {
            bytes,
            destination_port: Some(destination_port),
        };
        self
    }

    pub fn with_sc_address(mut self, sc_address: &str) -> Self {
        self.request.sc_address = Some(sc_address.to_string());
        self
    }

    /// 为每个分段附带发送令牌与投递令牌，返回两组接收端
    pub fn with_token_pairs(
        mut self,
        count: usize,
    ) -> (Self, Vec<CompletionReceiver>, Vec<CompletionReceiver>) {
        let (sent_tokens, sent_receivers) = token_pairs(count);
        let (delivered_tokens, delivered_receivers) = token_pairs(count);
        self.request.sent_tokens = sent_tokens;
        self.request.delivered_tokens = delivered_tokens;
        (self, sent_receivers, delivered_receivers)
    }

    pub fn build(self) -> SendRequest {
        self.request
    }
}

impl Default for SendRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
