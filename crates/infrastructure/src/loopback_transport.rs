use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sms_domain::{
    CompletionToken, MultimediaDispatch, PartCompletion, PartDispatch, PduFormat, ResultCode,
    Transport,
};
use sms_errors::SmsResult;
use tracing::{debug, info};

/// 本地回环传输
///
/// 不接触任何无线层：每个分段在短暂延迟后报告发送成功和投递成功，
/// 彩信只报告发送成功，注入的 PDU 直接确认接收。用于命令行工具和演示。
#[derive(Debug)]
pub struct LoopbackTransport {
    ims_available: bool,
    delay: Duration,
    dispatched: AtomicU64,
}

impl LoopbackTransport {
    pub fn new(ims_available: bool) -> Self {
        Self {
            ims_available,
            delay: Duration::from_millis(10),
            dispatched: AtomicU64::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    fn complete_later(&self, completion: PartCompletion, delivered: bool) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            completion.sent(ResultCode::Success);
            if delivered {
                completion.delivered();
            }
        });
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn is_ims_available(&self) -> bool {
        self.ims_available
    }

    async fn dispatch_part(&self, dispatch: PartDispatch) -> SmsResult<()> {
        debug!(
            "回环发送分段 {}/{} 至 {}，通道 {}",
            dispatch.part.index + 1,
            dispatch.part.total,
            dispatch.destination,
            dispatch.path.as_str()
        );
        self.complete_later(dispatch.completion, true);
        Ok(())
    }

    async fn dispatch_multimedia(&self, dispatch: MultimediaDispatch) -> SmsResult<()> {
        debug!(
            "回环发送彩信，PDU 长度 {}，通道 {}",
            dispatch.pdu.len(),
            dispatch.path.as_str()
        );
        self.complete_later(dispatch.completion, false);
        Ok(())
    }

    async fn inject_pdu(
        &self,
        pdu: Vec<u8>,
        format: PduFormat,
        received: Option<CompletionToken>,
    ) -> SmsResult<()> {
        debug!("回环注入 {} 格式 PDU，长度 {}", format.as_str(), pdu.len());
        if let Some(token) = received {
            token.fire(ResultCode::Success);
        }
        Ok(())
    }

    async fn set_cell_broadcast_range(&self, start: u16, end: u16, enabled: bool) -> SmsResult<bool> {
        info!(
            "回环{}小区广播范围 {}-{}",
            if enabled { "启用" } else { "停用" },
            start,
            end
        );
        Ok(true)
    }
}
