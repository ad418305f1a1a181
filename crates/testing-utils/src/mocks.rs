//! 分发端口的模拟实现
//!
//! 模拟对象自己不会完成任何分段，测试取出记录的分发请求，
//! 按场景需要的顺序触发完成回调。

use async_trait::async_trait;
use sms_domain::{
    CompletionToken, ImportedMultimedia, ImportedText, MessageStore, MultimediaDispatch,
    PartDispatch, PduFormat, StoredMessageStatus, StoredMultimedia, StoredText, Transport,
    TransportPath,
};
use sms_errors::{SmsError, SmsResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 记录所有调用的传输层模拟
#[derive(Debug, Clone)]
pub struct RecordingTransport {
    dispatches: Arc<Mutex<Vec<PartDispatch>>>,
    multimedia: Arc<Mutex<Vec<MultimediaDispatch>>>,
    injected: Arc<Mutex<Vec<(Vec<u8>, PduFormat, Option<CompletionToken>)>>>,
    cell_broadcast_calls: Arc<Mutex<Vec<(u16, u16, bool)>>>,
    ims_available: Arc<AtomicBool>,
    available: Arc<AtomicBool>,
    failing_paths: Arc<Mutex<Vec<TransportPath>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            dispatches: Arc::new(Mutex::new(Vec::new())),
            multimedia: Arc::new(Mutex::new(Vec::new())),
            injected: Arc::new(Mutex::new(Vec::new())),
            cell_broadcast_calls: Arc::new(Mutex::new(Vec::new())),
            ims_available: Arc::new(AtomicBool::new(false)),
            available: Arc::new(AtomicBool::new(true)),
            failing_paths: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_ims() -> Self {
        let transport = Self::new();
        transport.set_ims_available(true);
        transport
    }

    pub fn set_ims_available(&self, available: bool) {
        self.ims_available.store(available, Ordering::SeqCst);
    }

    /// 模拟无线服务不存在
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// 之后两条通道上的分发调用全部返回错误
    pub fn set_fail_dispatches(&self, fail: bool) {
        self.set_fail_path(TransportPath::Ims, fail);
        self.set_fail_path(TransportPath::Circuit, fail);
    }

    /// 只让指定通道上的分发调用返回错误
    pub fn set_fail_path(&self, path: TransportPath, fail: bool) {
        let mut paths = self.failing_paths.lock().unwrap();
        paths.retain(|p| *p != path);
        if fail {
            paths.push(path);
        }
    }

    pub fn dispatches(&self) -> Vec<PartDispatch> {
        self.dispatches.lock().unwrap().clone()
    }

    pub fn dispatches_via(&self, path: TransportPath) -> Vec<PartDispatch> {
        self.dispatches
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.path == path)
            .cloned()
            .collect()
    }

    /// 按分段序号排好序的分发记录
    pub fn dispatches_by_index(&self, path: TransportPath) -> Vec<PartDispatch> {
        let mut dispatches = self.dispatches_via(path);
        dispatches.sort_by_key(|d| d.part.index);
        dispatches
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().unwrap().len()
    }

    pub fn multimedia_dispatches(&self) -> Vec<MultimediaDispatch> {
        self.multimedia.lock().unwrap().clone()
    }

    /// 取出记录的注入 PDU，连同调用方的接收令牌
    pub fn take_injected(&self) -> Vec<(Vec<u8>, PduFormat, Option<CompletionToken>)> {
        std::mem::take(&mut *self.injected.lock().unwrap())
    }

    pub fn cell_broadcast_calls(&self) -> Vec<(u16, u16, bool)> {
        self.cell_broadcast_calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.dispatches.lock().unwrap().clear();
        self.multimedia.lock().unwrap().clear();
        self.injected.lock().unwrap().clear();
        self.cell_broadcast_calls.lock().unwrap().clear();
    }

    fn check(&self, path: TransportPath) -> SmsResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SmsError::transport_unavailable("模拟无线服务不可用"));
        }
        if self.failing_paths.lock().unwrap().contains(&path) {
            return Err(SmsError::Internal(format!(
                "模拟 {} 通道分发失败",
                path.as_str()
            )));
        }
        Ok(())
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn is_ims_available(&self) -> bool {
        self.ims_available.load(Ordering::SeqCst)
    }

    async fn dispatch_part(&self, dispatch: PartDispatch) -> SmsResult<()> {
        self.check(dispatch.path)?;
        debug!(
            "记录分段 {}/{}，通道 {}，引用号 {:?}",
            dispatch.part.index + 1,
            dispatch.part.total,
            dispatch.path.as_str(),
            dispatch.message_ref
        );
        self.dispatches.lock().unwrap().push(dispatch);
        Ok(())
    }

    async fn dispatch_multimedia(&self, dispatch: MultimediaDispatch) -> SmsResult<()> {
        self.check(dispatch.path)?;
        debug!("记录彩信，通道 {}", dispatch.path.as_str());
        self.multimedia.lock().unwrap().push(dispatch);
        Ok(())
    }

    async fn inject_pdu(
        &self,
        pdu: Vec<u8>,
        format: PduFormat,
        received: Option<CompletionToken>,
    ) -> SmsResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SmsError::transport_unavailable("模拟无线服务不可用"));
        }
        self.injected.lock().unwrap().push((pdu, format, received));
        Ok(())
    }

    async fn set_cell_broadcast_range(&self, start: u16, end: u16, enabled: bool) -> SmsResult<bool> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(SmsError::transport_unavailable("模拟无线服务不可用"));
        }
        self.cell_broadcast_calls
            .lock()
            .unwrap()
            .push((start, end, enabled));
        Ok(true)
    }
}

#[derive(Debug, Clone)]
enum StoredMessage {
    Text(StoredText),
    Multimedia(StoredMultimedia),
}

#[derive(Debug, Default)]
struct StoreState {
    messages: HashMap<String, StoredMessage>,
    conversations: HashMap<i64, Vec<String>>,
    statuses: HashMap<String, StoredMessageStatus>,
    auto_persisting: bool,
}

/// 内存中的消息库模拟
#[derive(Debug, Clone, Default)]
pub struct MockMessageStore {
    state: Arc<Mutex<StoreState>>,
    next_id: Arc<AtomicUsize>,
}

impl MockMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(self, id: &str, destination: &str, body: &str) -> Self {
        self.insert(
            id.to_string(),
            StoredMessage::Text(StoredText {
                destination: destination.to_string(),
                body: body.to_string(),
            }),
        );
        self
    }

    pub fn with_multimedia(self, id: &str, pdu: &[u8]) -> Self {
        self.insert(
            id.to_string(),
            StoredMessage::Multimedia(StoredMultimedia {
                pdu: pdu.to_vec(),
                location_url: None,
            }),
        );
        self
    }

    /// 把消息归入会话
    pub fn with_conversation(self, conversation_id: i64, ids: &[&str]) -> Self {
        self.state.lock().unwrap().conversations.insert(
            conversation_id,
            ids.iter().map(|id| id.to_string()).collect(),
        );
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().messages.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub fn text(&self, id: &str) -> Option<StoredText> {
        match self.state.lock().unwrap().messages.get(id) {
            Some(StoredMessage::Text(text)) => Some(text.clone()),
            _ => None,
        }
    }

    pub fn status(&self, id: &str) -> Option<StoredMessageStatus> {
        self.state.lock().unwrap().statuses.get(id).copied()
    }

    fn insert(&self, id: String, message: StoredMessage) {
        self.state.lock().unwrap().messages.insert(id, message);
    }

    fn allocate(&self, message: StoredMessage) -> String {
        let id = format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.insert(id.clone(), message);
        id
    }
}

#[async_trait]
impl MessageStore for MockMessageStore {
    async fn load_text(&self, message_id: &str) -> SmsResult<Option<StoredText>> {
        Ok(self.text(message_id))
    }

    async fn load_multimedia(&self, message_id: &str) -> SmsResult<Option<StoredMultimedia>> {
        match self.state.lock().unwrap().messages.get(message_id) {
            Some(StoredMessage::Multimedia(mms)) => Ok(Some(mms.clone())),
            _ => Ok(None),
        }
    }

    async fn delete(&self, message_id: &str) -> SmsResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.statuses.remove(message_id);
        Ok(state.messages.remove(message_id).is_some())
    }

    async fn delete_conversation(&self, conversation_id: i64) -> SmsResult<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(ids) = state.conversations.remove(&conversation_id) else {
            return Ok(false);
        };
        for id in ids {
            state.messages.remove(&id);
            state.statuses.remove(&id);
        }
        Ok(true)
    }

    async fn update_status(&self, message_id: &str, status: StoredMessageStatus) -> SmsResult<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.messages.contains_key(message_id) {
            return Ok(false);
        }
        let current = state.statuses.entry(message_id.to_string()).or_default();
        current.seen = status.seen.or(current.seen);
        current.read = status.read.or(current.read);
        current.archived = status.archived.or(current.archived);
        Ok(true)
    }

    async fn add_text_draft(&self, destination: &str, body: &str) -> SmsResult<String> {
        Ok(self.allocate(StoredMessage::Text(StoredText {
            destination: destination.to_string(),
            body: body.to_string(),
        })))
    }

    async fn add_multimedia_draft(&self, pdu: &[u8]) -> SmsResult<String> {
        Ok(self.allocate(StoredMessage::Multimedia(StoredMultimedia {
            pdu: pdu.to_vec(),
            location_url: None,
        })))
    }

    async fn import_text(&self, message: ImportedText) -> SmsResult<String> {
        let id = self.allocate(StoredMessage::Text(StoredText {
            destination: message.address,
            body: message.body,
        }));
        self.state.lock().unwrap().statuses.insert(
            id.clone(),
            StoredMessageStatus {
                seen: Some(message.seen),
                read: Some(message.read),
                archived: None,
            },
        );
        Ok(id)
    }

    async fn import_multimedia(&self, message: ImportedMultimedia) -> SmsResult<String> {
        let stored = StoredMessage::Multimedia(StoredMultimedia {
            pdu: message.pdu,
            location_url: None,
        });
        match message.message_id {
            Some(id) => {
                self.insert(id.clone(), stored);
                Ok(id)
            }
            None => Ok(self.allocate(stored)),
        }
    }

    async fn set_auto_persisting(&self, enabled: bool) -> SmsResult<()> {
        self.state.lock().unwrap().auto_persisting = enabled;
        Ok(())
    }

    async fn auto_persisting(&self) -> SmsResult<bool> {
        Ok(self.state.lock().unwrap().auto_persisting)
    }
}
