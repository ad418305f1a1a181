use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use metrics::counter;
use tracing::{debug, error, info, instrument, warn};

use sms_core::{FallbackConfig, SegmentationConfig, TrackingConfig};
use sms_domain::{
    CompletionToken, DispatchHandle, FallbackState, ImportedMultimedia, ImportedText, MessageId,
    MessageKind, MessagePart, MessageRef, MessageStore, MultimediaDispatch, PartCompletion,
    PartCompletionSink, PartDispatch, PartState, PduFormat, ResultCode, SendRequest, SlotRecord,
    SlotStatus, SlotStore, StoredMessageStatus, Transport, TransportPath,
};
use sms_errors::{SmsError, SmsResult};

use crate::delivery_tracker::DeliveryStatusTracker;
use crate::fallback::{
    FallbackDecision, FallbackEntry, FallbackPayload, TransportFallbackStateMachine,
};
use crate::segmenter::MessageSegmenter;

/// 记录中无短信中心地址时的占位字节
const NO_SMSC: u8 = 0x00;

/// 调度协调器
///
/// 接收发送请求，分段后为每个分段独立分发，分段结果经跟踪器汇总。
/// IMS 可用时先走 IP 通道，运营商应用报告失败后经电路域重发一次。
/// ICC 与消息库相关操作只是对外部存储的校验与转发。
pub struct DispatchCoordinator {
    transport: Arc<dyn Transport>,
    slot_store: Arc<dyn SlotStore>,
    message_store: Option<Arc<dyn MessageStore>>,
    segmenter: MessageSegmenter,
    tracker: Arc<DeliveryStatusTracker>,
    fallback: TransportFallbackStateMachine,
    fallback_config: FallbackConfig,
}

impl DispatchCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        slot_store: Arc<dyn SlotStore>,
        segmentation: SegmentationConfig,
        tracking: &TrackingConfig,
        fallback_config: FallbackConfig,
    ) -> Self {
        Self {
            transport,
            slot_store,
            message_store: None,
            segmenter: MessageSegmenter::new(segmentation),
            tracker: Arc::new(DeliveryStatusTracker::new(tracking.retirement_timeout())),
            fallback: TransportFallbackStateMachine::new(),
            fallback_config,
        }
    }

    pub fn with_message_store(mut self, message_store: Arc<dyn MessageStore>) -> Self {
        self.message_store = Some(message_store);
        self
    }

    pub fn tracker(&self) -> &Arc<DeliveryStatusTracker> {
        &self.tracker
    }

    pub fn segmenter(&self) -> &MessageSegmenter {
        &self.segmenter
    }

    /// 发送一条消息
    ///
    /// 分发调用全部发出后立即返回，分段结果稍后通过请求中的完成令牌送达。
    /// IP 通道未受理的分段立即改走电路域；两条通道都未受理的分段以通用失败结束。
    #[instrument(skip(self, request), fields(destination = %request.destination))]
    pub async fn send(&self, request: SendRequest) -> SmsResult<DispatchHandle> {
        request.validate()?;
        let parts = self.segmenter.segment_payload(&request.payload)?;

        let SendRequest {
            destination,
            sc_address,
            sent_tokens,
            delivered_tokens,
            ..
        } = request;

        let message_id = MessageId::new();
        let part_count = parts.len();
        let path = self.select_path();

        self.tracker
            .register(message_id, part_count, sent_tokens, delivered_tokens);

        info!(
            "发送消息 {}，分段数 {}，通道 {}",
            message_id,
            part_count,
            path.as_str()
        );

        let message_ref = match path {
            TransportPath::Circuit => {
                let rejected = self
                    .dispatch_parts(message_id, &destination, sc_address.as_deref(), parts, path, None)
                    .await;
                self.fail_parts(message_id, &rejected);
                None
            }
            TransportPath::Ims => {
                let message_ref = self.fallback.register(
                    message_id,
                    FallbackPayload::Sms {
                        destination: destination.clone(),
                        sc_address: sc_address.clone(),
                        parts: parts.clone(),
                    },
                );
                let rejected = self
                    .dispatch_parts(
                        message_id,
                        &destination,
                        sc_address.as_deref(),
                        parts,
                        path,
                        Some(message_ref),
                    )
                    .await;
                if !rejected.is_empty() {
                    let indices: Vec<usize> = rejected.iter().map(|part| part.index).collect();
                    warn!(
                        "引用号 {} 有 {} 个分段未被 IP 通道受理，立即经电路域发送",
                        message_ref,
                        indices.len()
                    );
                    self.fallback.detach_parts(message_ref, &indices);
                    let rejected = self
                        .dispatch_parts(
                            message_id,
                            &destination,
                            sc_address.as_deref(),
                            rejected,
                            TransportPath::Circuit,
                            None,
                        )
                        .await;
                    self.fail_parts(message_id, &rejected);
                }
                Some(message_ref)
            }
        };

        Ok(DispatchHandle {
            message_id,
            part_count,
            path,
            message_ref,
            dispatched_at: Utc::now(),
        })
    }

    /// 发送一条彩信，PDU 不分段
    ///
    /// 与短信一样优先走 IP 通道，汇总结果送达 `sent_token`。
    #[instrument(skip(self, pdu, sent_token))]
    pub async fn send_multimedia(
        &self,
        pdu: Vec<u8>,
        location_url: Option<String>,
        sent_token: Option<CompletionToken>,
    ) -> SmsResult<DispatchHandle> {
        if pdu.is_empty() {
            return Err(SmsError::invalid_argument("彩信 PDU 不能为空"));
        }

        let message_id = MessageId::new();
        let path = self.select_path();
        self.tracker
            .register(message_id, 1, sent_token.into_iter().collect(), Vec::new());
        info!("发送彩信 {}，通道 {}", message_id, path.as_str());

        let message_ref = match path {
            TransportPath::Ims => Some(self.fallback.register(
                message_id,
                FallbackPayload::Mms {
                    pdu: pdu.clone(),
                    location_url: location_url.clone(),
                },
            )),
            TransportPath::Circuit => None,
        };

        let mut accepted = self
            .dispatch_multimedia(message_id, pdu.clone(), location_url.clone(), path, message_ref)
            .await;
        if let (false, Some(message_ref)) = (accepted, message_ref) {
            warn!("引用号 {} 的彩信未被 IP 通道受理，立即经电路域发送", message_ref);
            self.fallback.detach_parts(message_ref, &[0]);
            accepted = self
                .dispatch_multimedia(message_id, pdu, location_url, TransportPath::Circuit, None)
                .await;
        }
        if !accepted {
            self.tracker
                .on_part_sent(message_id, 0, ResultCode::GenericFailure);
        }

        Ok(DispatchHandle {
            message_id,
            part_count: 1,
            path,
            message_ref,
            dispatched_at: Utc::now(),
        })
    }

    /// 运营商应用报告短信在 IP 通道的发送结果，错误只记录不传播
    pub async fn report_outcome(&self, message_ref: MessageRef, success: bool) {
        self.handle_outcome(MessageKind::Sms, message_ref, success)
            .await;
    }

    /// 运营商应用报告彩信在 IP 通道的发送结果，失败时经运营商网络重发
    pub async fn report_mms_outcome(&self, message_ref: MessageRef, success: bool) {
        self.handle_outcome(MessageKind::Mms, message_ref, success)
            .await;
    }

    #[instrument(skip(self))]
    async fn handle_outcome(&self, kind: MessageKind, message_ref: MessageRef, success: bool) {
        match self.fallback.report_outcome(kind, message_ref, success) {
            FallbackDecision::Ignored => {}
            FallbackDecision::Succeeded(entry) => {
                let indices: Vec<usize> = match &entry.payload {
                    FallbackPayload::Sms { parts, .. } => parts.iter().map(|p| p.index).collect(),
                    FallbackPayload::Mms { .. } => vec![0],
                };
                self.tracker
                    .settle_pending(entry.message_id, &indices, ResultCode::Success);
            }
            FallbackDecision::Resend(entry) => {
                self.resend_via_circuit(entry).await;
                self.fallback.mark_resent(message_ref);
            }
        }
    }

    /// 只重发仍在等待结果的部分：已投递或上下文已回收的内容不再发送
    async fn resend_via_circuit(&self, entry: FallbackEntry) {
        let FallbackEntry {
            message_ref,
            message_id,
            payload,
            ..
        } = entry;

        let Some(states) = self.tracker.part_states(message_id) else {
            info!("引用号 {} 的跟踪上下文已回收，不再重发", message_ref);
            return;
        };
        let is_pending = |index: usize| matches!(states.get(index), Some(PartState::Pending));

        match payload {
            FallbackPayload::Sms {
                destination,
                sc_address,
                parts,
            } => {
                let pending: Vec<MessagePart> =
                    parts.into_iter().filter(|part| is_pending(part.index)).collect();
                if pending.is_empty() {
                    info!("引用号 {} 的分段均已有结果，无需重发", message_ref);
                    return;
                }

                info!(
                    "引用号 {} 的消息 {} 经电路域重发 {} 个分段",
                    message_ref,
                    message_id,
                    pending.len()
                );
                counter!("sms_fallback_resends_total", "kind" => MessageKind::Sms.as_str())
                    .increment(1);
                let rejected = self
                    .dispatch_parts(
                        message_id,
                        &destination,
                        sc_address.as_deref(),
                        pending,
                        TransportPath::Circuit,
                        None,
                    )
                    .await;
                self.fail_parts(message_id, &rejected);
            }
            FallbackPayload::Mms { pdu, location_url } => {
                if !is_pending(0) {
                    info!("引用号 {} 的彩信已有结果，无需重发", message_ref);
                    return;
                }

                info!("引用号 {} 的彩信 {} 经运营商网络重发", message_ref, message_id);
                counter!("sms_fallback_resends_total", "kind" => MessageKind::Mms.as_str())
                    .increment(1);
                let accepted = self
                    .dispatch_multimedia(message_id, pdu, location_url, TransportPath::Circuit, None)
                    .await;
                if !accepted {
                    self.tracker
                        .on_part_sent(message_id, 0, ResultCode::GenericFailure);
                }
            }
        }
    }

    pub fn fallback_state(&self, message_ref: MessageRef) -> Option<FallbackState> {
        self.fallback.state(message_ref)
    }

    pub fn part_states(&self, message_id: MessageId) -> Option<Vec<PartState>> {
        self.tracker.part_states(message_id)
    }

    /// 回收超时的跟踪上下文，以及上下文已不存在的回退状态
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let expired = self.tracker.sweep_expired(now).len();
        let tracker = &self.tracker;
        let retired = self.fallback.retire_untracked(|id| tracker.contains(id));
        if expired > 0 || retired > 0 {
            debug!("本轮回收跟踪上下文 {} 个，回退状态 {} 个", expired, retired);
        }
        expired
    }

    /// 将一条短信写入 ICC，记录内容为短信中心地址（缺省为 0x00）后接 PDU
    pub async fn copy_message_to_icc(
        &self,
        smsc: Option<&[u8]>,
        pdu: &[u8],
        status: i32,
    ) -> SmsResult<bool> {
        if pdu.is_empty() {
            return Err(SmsError::invalid_argument("PDU 不能为空"));
        }
        let status = SlotStatus::from_wire(status)?;
        if status.is_free() {
            return Err(SmsError::invalid_argument("写入 ICC 的状态不能为 Free"));
        }

        let mut record = match smsc {
            Some(smsc) if !smsc.is_empty() => smsc.to_vec(),
            _ => vec![NO_SMSC],
        };
        record.extend_from_slice(pdu);

        let result = self.slot_store.write(&record, status).await.map(|index| {
            debug!("短信已写入 ICC 槽位 {}", index);
        });
        Self::store_outcome("写入 ICC", result)
    }

    /// 更新 ICC 中的一条记录，状态为 Free 时等同于删除
    pub async fn update_message_on_icc(&self, index: usize, status: i32, pdu: &[u8]) -> SmsResult<bool> {
        let status = SlotStatus::from_wire(status)?;
        if status.is_free() {
            return self.delete_message_from_icc(index).await;
        }
        if pdu.is_empty() {
            return Err(SmsError::invalid_argument("PDU 不能为空"));
        }

        let result = self.slot_store.update(index, status, pdu).await;
        Self::store_outcome("更新 ICC", result)
    }

    pub async fn delete_message_from_icc(&self, index: usize) -> SmsResult<bool> {
        let result = self.slot_store.erase(index).await;
        Self::store_outcome("删除 ICC", result)
    }

    pub async fn get_all_messages_from_icc(&self) -> SmsResult<Vec<SlotRecord>> {
        self.slot_store.read_all().await
    }

    /// 发送持久化消息库中的一条文本
    pub async fn send_stored_text(
        &self,
        message_id: &str,
        sc_address: Option<String>,
        sent_tokens: Vec<CompletionToken>,
        delivered_tokens: Vec<CompletionToken>,
    ) -> SmsResult<DispatchHandle> {
        Self::require_id(message_id)?;
        let store = self.message_store()?;
        let stored = store.load_text(message_id).await?.ok_or_else(|| {
            SmsError::invalid_argument(format!("消息库中不存在消息 {message_id}"))
        })?;

        let mut request = SendRequest::text(stored.destination, stored.body)
            .with_tokens(sent_tokens, delivered_tokens);
        request.sc_address = sc_address;
        self.send(request).await
    }

    /// 发送消息库中的一条彩信
    pub async fn send_stored_multimedia(
        &self,
        message_id: &str,
        sent_token: Option<CompletionToken>,
    ) -> SmsResult<DispatchHandle> {
        Self::require_id(message_id)?;
        let stored = self
            .message_store()?
            .load_multimedia(message_id)
            .await?
            .ok_or_else(|| SmsError::invalid_argument(format!("消息库中不存在彩信 {message_id}")))?;
        self.send_multimedia(stored.pdu, stored.location_url, sent_token)
            .await
    }

    pub async fn delete_stored_message(&self, message_id: &str) -> SmsResult<bool> {
        Self::require_id(message_id)?;
        self.message_store()?.delete(message_id).await
    }

    pub async fn delete_stored_conversation(&self, conversation_id: i64) -> SmsResult<bool> {
        self.message_store()?
            .delete_conversation(conversation_id)
            .await
    }

    pub async fn update_stored_message_status(
        &self,
        message_id: &str,
        status: StoredMessageStatus,
    ) -> SmsResult<bool> {
        Self::require_id(message_id)?;
        if status.is_empty() {
            return Err(SmsError::invalid_argument("没有需要更新的状态属性"));
        }
        self.message_store()?.update_status(message_id, status).await
    }

    pub async fn add_text_message_draft(&self, destination: &str, body: &str) -> SmsResult<String> {
        let id = self
            .message_store()?
            .add_text_draft(destination, body)
            .await?;
        Self::check_returned_id(id)
    }

    pub async fn add_multimedia_message_draft(&self, pdu: &[u8]) -> SmsResult<String> {
        if pdu.is_empty() {
            return Err(SmsError::invalid_argument("彩信 PDU 不能为空"));
        }
        let id = self.message_store()?.add_multimedia_draft(pdu).await?;
        Self::check_returned_id(id)
    }

    pub async fn import_text_message(&self, message: ImportedText) -> SmsResult<String> {
        if message.address.is_empty() {
            return Err(SmsError::invalid_argument("导入短信的地址不能为空"));
        }
        let id = self.message_store()?.import_text(message).await?;
        Self::check_returned_id(id)
    }

    pub async fn import_multimedia_message(&self, message: ImportedMultimedia) -> SmsResult<String> {
        if message.pdu.is_empty() {
            return Err(SmsError::invalid_argument("彩信 PDU 不能为空"));
        }
        let id = self.message_store()?.import_multimedia(message).await?;
        Self::check_returned_id(id)
    }

    /// 开启后收发的短信彩信都由消息库自动保存
    pub async fn set_auto_persisting(&self, enabled: bool) -> SmsResult<()> {
        self.message_store()?.set_auto_persisting(enabled).await
    }

    pub async fn auto_persisting(&self) -> SmsResult<bool> {
        self.message_store()?.auto_persisting().await
    }

    /// 把一条 PDU 注入接收流程，格式只接受 3gpp 与 3gpp2
    ///
    /// 传输层不可用时记录并返回 false。
    pub async fn inject_sms_pdu(
        &self,
        pdu: &[u8],
        format: &str,
        received_token: Option<CompletionToken>,
    ) -> SmsResult<bool> {
        let format = PduFormat::parse(format)?;
        if pdu.is_empty() {
            return Err(SmsError::invalid_argument("PDU 不能为空"));
        }

        match self
            .transport
            .inject_pdu(pdu.to_vec(), format, received_token)
            .await
        {
            Ok(()) => {
                debug!("已注入 {} 格式的 PDU，长度 {}", format.as_str(), pdu.len());
                Ok(true)
            }
            Err(e) => {
                warn!("注入 PDU 失败: {}", e);
                Ok(false)
            }
        }
    }

    pub async fn enable_cell_broadcast(&self, message_identifier: u16) -> SmsResult<bool> {
        self.enable_cell_broadcast_range(message_identifier, message_identifier)
            .await
    }

    pub async fn disable_cell_broadcast(&self, message_identifier: u16) -> SmsResult<bool> {
        self.disable_cell_broadcast_range(message_identifier, message_identifier)
            .await
    }

    pub async fn enable_cell_broadcast_range(&self, start: u16, end: u16) -> SmsResult<bool> {
        self.set_cell_broadcast_range(start, end, true).await
    }

    pub async fn disable_cell_broadcast_range(&self, start: u16, end: u16) -> SmsResult<bool> {
        self.set_cell_broadcast_range(start, end, false).await
    }

    async fn set_cell_broadcast_range(&self, start: u16, end: u16, enabled: bool) -> SmsResult<bool> {
        if end < start {
            return Err(SmsError::invalid_argument(format!(
                "小区广播范围无效: {start}-{end}"
            )));
        }
        match self.transport.set_cell_broadcast_range(start, end, enabled).await {
            Ok(accepted) => Ok(accepted),
            Err(e) => {
                warn!("设置小区广播范围 {}-{} 失败: {}", start, end, e);
                Ok(false)
            }
        }
    }

    fn message_store(&self) -> SmsResult<&Arc<dyn MessageStore>> {
        self.message_store
            .as_ref()
            .ok_or_else(|| SmsError::transport_unavailable("未配置消息库"))
    }

    fn require_id(message_id: &str) -> SmsResult<()> {
        if message_id.is_empty() {
            return Err(SmsError::invalid_argument("消息标识不能为空"));
        }
        Ok(())
    }

    fn check_returned_id(message_id: String) -> SmsResult<String> {
        if message_id.is_empty() {
            return Err(SmsError::Internal("消息库返回了空的消息标识".to_string()));
        }
        Ok(message_id)
    }

    fn select_path(&self) -> TransportPath {
        if self.fallback_config.ims_enabled && self.transport.is_ims_available() {
            TransportPath::Ims
        } else {
            TransportPath::Circuit
        }
    }

    /// 并发分发所有分段，返回分发调用本身失败的分段
    async fn dispatch_parts(
        &self,
        message_id: MessageId,
        destination: &str,
        sc_address: Option<&str>,
        parts: Vec<MessagePart>,
        path: TransportPath,
        message_ref: Option<MessageRef>,
    ) -> Vec<MessagePart> {
        let sink: Arc<dyn PartCompletionSink> = self.tracker.clone();

        let dispatches = parts.into_iter().map(|part| {
            let completion = match path {
                TransportPath::Ims => {
                    PartCompletion::delivery_only(message_id, part.index, sink.clone())
                }
                TransportPath::Circuit => PartCompletion::new(message_id, part.index, sink.clone()),
            };
            let dispatch = PartDispatch {
                part: part.clone(),
                destination: destination.to_string(),
                sc_address: sc_address.map(str::to_string),
                path,
                message_ref,
                completion,
            };
            async move { (part, self.transport.dispatch_part(dispatch).await) }
        });

        let mut rejected = Vec::new();
        for (part, result) in join_all(dispatches).await {
            match result {
                Ok(()) => {
                    counter!("sms_parts_dispatched_total", "path" => path.as_str()).increment(1);
                }
                Err(e) => {
                    error!(
                        "消息 {} 分段 {} 经 {} 通道分发失败: {}",
                        message_id,
                        part.index,
                        path.as_str(),
                        e
                    );
                    rejected.push(part);
                }
            }
        }
        rejected
    }

    async fn dispatch_multimedia(
        &self,
        message_id: MessageId,
        pdu: Vec<u8>,
        location_url: Option<String>,
        path: TransportPath,
        message_ref: Option<MessageRef>,
    ) -> bool {
        let sink: Arc<dyn PartCompletionSink> = self.tracker.clone();
        let completion = match path {
            TransportPath::Ims => PartCompletion::delivery_only(message_id, 0, sink),
            TransportPath::Circuit => PartCompletion::new(message_id, 0, sink),
        };
        let dispatch = MultimediaDispatch {
            pdu,
            location_url,
            path,
            message_ref,
            completion,
        };

        match self.transport.dispatch_multimedia(dispatch).await {
            Ok(()) => {
                counter!("sms_parts_dispatched_total", "path" => path.as_str()).increment(1);
                true
            }
            Err(e) => {
                error!("彩信 {} 经 {} 通道分发失败: {}", message_id, path.as_str(), e);
                false
            }
        }
    }

    fn fail_parts(&self, message_id: MessageId, parts: &[MessagePart]) {
        for part in parts {
            self.tracker
                .on_part_sent(message_id, part.index, ResultCode::GenericFailure);
        }
    }

    /// 调用方输入错误直接返回，存储层的失败转换为 false
    fn store_outcome(operation: &str, result: SmsResult<()>) -> SmsResult<bool> {
        match result {
            Ok(()) => Ok(true),
            Err(e @ SmsError::InvalidArgument(_)) => Err(e),
            Err(e) => {
                warn!("{}失败: {}", operation, e);
                Ok(false)
            }
        }
    }
}
