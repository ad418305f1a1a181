use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sms_errors::SmsResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredText {
    pub destination: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMultimedia {
    pub pdu: Vec<u8>,
    pub location_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageDirection {
    Incoming,
    Outgoing,
}

/// 导入消息库的一条文本短信
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedText {
    pub address: String,
    pub direction: MessageDirection,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub seen: bool,
    pub read: bool,
}

/// 导入消息库的一条彩信，`message_id` 与 `timestamp` 可缺省
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedMultimedia {
    pub pdu: Vec<u8>,
    pub message_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub seen: bool,
    pub read: bool,
}

/// 存储消息的状态属性，None 表示不修改
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessageStatus {
    pub seen: Option<bool>,
    pub read: Option<bool>,
    pub archived: Option<bool>,
}

impl StoredMessageStatus {
    pub fn is_empty(&self) -> bool {
        self.seen.is_none() && self.read.is_none() && self.archived.is_none()
    }
}

/// 外部持久化消息库（草稿、历史），标识对本核心是不透明的
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn load_text(&self, message_id: &str) -> SmsResult<Option<StoredText>>;

    async fn load_multimedia(&self, message_id: &str) -> SmsResult<Option<StoredMultimedia>>;

    async fn delete(&self, message_id: &str) -> SmsResult<bool>;

    async fn delete_conversation(&self, conversation_id: i64) -> SmsResult<bool>;

    async fn update_status(&self, message_id: &str, status: StoredMessageStatus) -> SmsResult<bool>;

    /// 以下写入操作返回新消息的标识
    async fn add_text_draft(&self, destination: &str, body: &str) -> SmsResult<String>;

    async fn add_multimedia_draft(&self, pdu: &[u8]) -> SmsResult<String>;

    async fn import_text(&self, message: ImportedText) -> SmsResult<String>;

    async fn import_multimedia(&self, message: ImportedMultimedia) -> SmsResult<String>;

    async fn set_auto_persisting(&self, enabled: bool) -> SmsResult<()>;

    async fn auto_persisting(&self) -> SmsResult<bool>;
}
