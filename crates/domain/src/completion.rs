//! 完成令牌
//!
//! 调用方持有接收端，核心只负责“携带结果码触发一次”。令牌在触发时被消费，
//! 因此同一个令牌不可能被触发两次。

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::value_objects::{MessageId, ResultCode};

pub type CompletionReceiver = oneshot::Receiver<ResultCode>;

pub struct CompletionToken {
    sender: oneshot::Sender<ResultCode>,
}

impl CompletionToken {
    pub fn channel() -> (Self, CompletionReceiver) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// 触发令牌。接收端已被丢弃时返回 false
    pub fn fire(self, code: ResultCode) -> bool {
        self.sender.send(code).is_ok()
    }

    pub fn is_abandoned(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionToken")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// 分段完成信号的接收方，由投递状态跟踪器实现
pub trait PartCompletionSink: Send + Sync {
    fn part_sent(&self, message_id: MessageId, index: usize, code: ResultCode);
    fn part_delivered(&self, message_id: MessageId, index: usize);
}

/// 交给传输层的单个分段回调句柄
///
/// 传输层可以按至少一次语义重复回调，跟踪器保证幂等。
#[derive(Clone)]
pub struct PartCompletion {
    message_id: MessageId,
    index: usize,
    reports_sent: bool,
    sink: Arc<dyn PartCompletionSink>,
}

impl PartCompletion {
    pub fn new(message_id: MessageId, index: usize, sink: Arc<dyn PartCompletionSink>) -> Self {
        Self {
            message_id,
            index,
            reports_sent: true,
            sink,
        }
    }

    /// IP 通道的分段：发送结果由运营商应用回报，这里只转发投递报告
    pub fn delivery_only(message_id: MessageId, index: usize, sink: Arc<dyn PartCompletionSink>) -> Self {
        Self {
            message_id,
            index,
            reports_sent: false,
            sink,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reports_sent(&self) -> bool {
        self.reports_sent
    }

    pub fn sent(&self, code: ResultCode) {
        if self.reports_sent {
            self.sink.part_sent(self.message_id, self.index, code);
        }
    }

    pub fn delivered(&self) {
        self.sink.part_delivered(self.message_id, self.index);
    }
}

impl fmt::Debug for PartCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartCompletion")
            .field("message_id", &self.message_id)
            .field("index", &self.index)
            .field("reports_sent", &self.reports_sent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<(usize, ResultCode)>>,
        delivered: Mutex<Vec<usize>>,
    }

    impl PartCompletionSink for RecordingSink {
        fn part_sent(&self, _message_id: MessageId, index: usize, code: ResultCode) {
            self.sent.lock().unwrap().push((index, code));
        }

        fn part_delivered(&self, _message_id: MessageId, index: usize) {
            self.delivered.lock().unwrap().push(index);
        }
    }

    #[tokio::test]
    async fn test_token_fires_once() {
        let (token, receiver) = CompletionToken::channel();
        assert!(!token.is_abandoned());
        assert!(token.fire(ResultCode::RadioOff));
        assert_eq!(receiver.await.unwrap(), ResultCode::RadioOff);
    }

    #[test]
    fn test_token_with_dropped_receiver() {
        let (token, receiver) = CompletionToken::channel();
        drop(receiver);
        assert!(token.is_abandoned());
        assert!(!token.fire(ResultCode::Success));
    }

    #[test]
    fn test_delivery_only_completion_suppresses_sent() {
        let sink = Arc::new(RecordingSink::default());
        let id = MessageId::new();

        let completion = PartCompletion::delivery_only(id, 2, sink.clone());
        completion.sent(ResultCode::Success);
        completion.delivered();

        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(*sink.delivered.lock().unwrap(), vec![2]);

        let completion = PartCompletion::new(id, 1, sink.clone());
        completion.sent(ResultCode::NoService);
        assert_eq!(*sink.sent.lock().unwrap(), vec![(1, ResultCode::NoService)]);
    }
}
