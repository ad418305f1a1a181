use async_trait::async_trait;
use sms_errors::SmsResult;

use crate::completion::{CompletionToken, PartCompletion};
use crate::entities::MessagePart;
use crate::value_objects::{MessageRef, PduFormat, TransportPath};

/// 单个分段的分发请求
///
/// 经 IP 通道发出时携带消息引用号，运营商应用报告结果时以此关联。
#[derive(Debug, Clone)]
pub struct PartDispatch {
    pub part: MessagePart,
    pub destination: String,
    pub sc_address: Option<String>,
    pub path: TransportPath,
    pub message_ref: Option<MessageRef>,
    pub completion: PartCompletion,
}

/// 一条彩信的分发请求，PDU 作为整体发送
#[derive(Debug, Clone)]
pub struct MultimediaDispatch {
    pub pdu: Vec<u8>,
    pub location_url: Option<String>,
    pub path: TransportPath,
    pub message_ref: Option<MessageRef>,
    pub completion: PartCompletion,
}

/// 外部传输层
///
/// `dispatch_part` 立即返回，结果稍后通过 `PartCompletion` 回调。
/// 服务不存在时返回 `SmsError::TransportUnavailable`。
#[async_trait]
pub trait Transport: Send + Sync {
    fn is_ims_available(&self) -> bool;

    async fn dispatch_part(&self, dispatch: PartDispatch) -> SmsResult<()>;

    async fn dispatch_multimedia(&self, dispatch: MultimediaDispatch) -> SmsResult<()>;

    /// 把一条 PDU 当作从无线层收到的短信交给上层，`received` 在上层确认接收时触发
    async fn inject_pdu(
        &self,
        pdu: Vec<u8>,
        format: PduFormat,
        received: Option<CompletionToken>,
    ) -> SmsResult<()>;

    async fn set_cell_broadcast_range(&self, start: u16, end: u16, enabled: bool) -> SmsResult<bool>;
}
