use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sms_errors::{SmsError, SmsResult};

use crate::completion::CompletionToken;
use crate::value_objects::{Encoding, MessageId, MessageRef, ResultCode, SlotStatus, TransportPath};

/// 发送内容：文本，或发往指定端口的二进制数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Data {
        bytes: Vec<u8>,
        destination_port: Option<u16>,
    },
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Text(text) => text.is_empty(),
            Payload::Data { bytes, .. } => bytes.is_empty(),
        }
    }
}

/// 发送请求，被调度器接收后不再修改
///
/// `sent_tokens` / `delivered_tokens` 按分段序号一一对应，可以为空。
#[derive(Debug)]
pub struct SendRequest {
    pub destination: String,
    pub sc_address: Option<String>,
    pub payload: Payload,
    pub sent_tokens: Vec<CompletionToken>,
    pub delivered_tokens: Vec<CompletionToken>,
}

impl SendRequest {
    pub fn text(destination: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            sc_address: None,
            payload: Payload::Text(text.into()),
            sent_tokens: Vec::new(),
            delivered_tokens: Vec::new(),
        }
    }

    pub fn data(destination: impl Into<String>, bytes: Vec<u8>, destination_port: Option<u16>) -> Self {
        Self {
            destination: destination.into(),
            sc_address: None,
            payload: Payload::Data {
                bytes,
                destination_port,
            },
            sent_tokens: Vec::new(),
            delivered_tokens: Vec::new(),
        }
    }

    pub fn with_sc_address(mut self, sc_address: impl Into<String>) -> Self {
        self.sc_address = Some(sc_address.into());
        self
    }

    pub fn with_tokens(
        mut self,
        sent_tokens: Vec<CompletionToken>,
        delivered_tokens: Vec<CompletionToken>,
    ) -> Self {
        self.sent_tokens = sent_tokens;
        self.delivered_tokens = delivered_tokens;
        self
    }

    /// 校验请求形状，在任何传输交互之前调用
    pub fn validate(&self) -> SmsResult<()> {
        if self.destination.is_empty() {
            return Err(SmsError::invalid_argument("目标地址不能为空"));
        }
        if self.payload.is_empty() {
            return Err(SmsError::invalid_argument("消息内容不能为空"));
        }
        Ok(())
    }
}

/// 消息分段
///
/// 分段自身的完成令牌保存在跟踪上下文中，以 `index` 关联。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    pub index: usize,
    pub total: usize,
    pub encoding: Encoding,
    /// 文本分段的原文，二进制分段为 None
    pub text: Option<String>,
    /// 编码单元序列：GSM7 每个septet一个字节，UCS2 为大端字节序
    pub payload: Vec<u8>,
    pub destination_port: Option<u16>,
}

impl MessagePart {
    pub fn is_multipart(&self) -> bool {
        self.total > 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartState {
    Pending,
    Sent,
    SendFailed(ResultCode),
    Delivered,
}

impl PartState {
    /// 发送阶段是否已有结果
    pub fn is_settled(&self) -> bool {
        !matches!(self, PartState::Pending)
    }

    pub fn send_result(&self) -> Option<ResultCode> {
        match self {
            PartState::Pending => None,
            PartState::Sent | PartState::Delivered => Some(ResultCode::Success),
            PartState::SendFailed(code) => Some(*code),
        }
    }
}

/// 槽位存储中的一条记录，`index` 从1开始
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub index: usize,
    pub status: SlotStatus,
    pub data: Vec<u8>,
}

impl SlotRecord {
    pub const ERASED_BYTE: u8 = 0xFF;

    pub fn erased(index: usize, record_size: usize) -> Self {
        Self {
            index,
            status: SlotStatus::Free,
            data: Self::erased_pattern(record_size),
        }
    }

    pub fn erased_pattern(record_size: usize) -> Vec<u8> {
        vec![Self::ERASED_BYTE; record_size]
    }

    /// 将记录内容用擦除字节补齐到固定长度
    pub fn pad(bytes: &[u8], record_size: usize) -> SmsResult<Vec<u8>> {
        if bytes.len() > record_size {
            return Err(SmsError::invalid_argument(format!(
                "记录长度 {} 超过槽位大小 {}",
                bytes.len(),
                record_size
            )));
        }
        let mut data = bytes.to_vec();
        data.resize(record_size, Self::ERASED_BYTE);
        Ok(data)
    }

    pub fn is_free(&self) -> bool {
        self.status.is_free()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackState {
    AwaitingIpResult,
    IpSucceeded,
    IpFailedAwaitingResend,
    ResentViaCircuit,
    Terminal,
}

/// `send` 的返回值：分发已发出，结果稍后通过完成令牌异步到达
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchHandle {
    pub message_id: MessageId,
    pub part_count: usize,
    pub path: TransportPath,
    pub message_ref: Option<MessageRef>,
    pub dispatched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_validation() {
        assert!(SendRequest::text("10086", "hello").validate().is_ok());

        let err = SendRequest::text("", "hello").validate().unwrap_err();
        assert!(matches!(err, SmsError::InvalidArgument(_)));

        let err = SendRequest::text("10086", "").validate().unwrap_err();
        assert!(matches!(err, SmsError::InvalidArgument(_)));

        let err = SendRequest::data("10086", vec![], Some(8080)).validate().unwrap_err();
        assert!(matches!(err, SmsError::InvalidArgument(_)));
    }

    #[test]
    fn test_slot_record_padding() {
        let data = SlotRecord::pad(&[0x01, 0x02], 4).unwrap();
        assert_eq!(data, vec![0x01, 0x02, 0xFF, 0xFF]);
        assert!(SlotRecord::pad(&[0; 5], 4).is_err());

        let erased = SlotRecord::erased(3, 4);
        assert!(erased.is_free());
        assert_eq!(erased.data, vec![0xFF; 4]);
    }

    #[test]
    fn test_part_state_send_result() {
        assert_eq!(PartState::Pending.send_result(), None);
        assert_eq!(PartState::Delivered.send_result(), Some(ResultCode::Success));
        assert_eq!(
            PartState::SendFailed(ResultCode::RadioOff).send_result(),
            Some(ResultCode::RadioOff)
        );
        assert!(!PartState::Pending.is_settled());
        assert!(PartState::Sent.is_settled());
    }

    #[test]
    fn test_dispatch_handle_json() {
        let handle = DispatchHandle {
            message_id: MessageId::new(),
            part_count: 3,
            path: TransportPath::Ims,
            message_ref: Some(MessageRef(7)),
            dispatched_at: Utc::now(),
        };
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["part_count"], 3);
        assert_eq!(json["path"], "Ims");
        assert_eq!(json["message_ref"], 7);

        let parsed: DispatchHandle = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, handle);
    }
}
