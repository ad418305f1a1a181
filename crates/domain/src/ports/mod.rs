//! 与外部协作方交互的端口
//!
//! 无线/IMS 传输、运营商侧持久化消息库都在本核心之外，这里只定义边界。

pub mod message_store;
pub mod transport;

pub use message_store::{
    ImportedMultimedia, ImportedText, MessageDirection, MessageStore, StoredMessageStatus,
    StoredMultimedia, StoredText,
};
pub use transport::{MultimediaDispatch, PartDispatch, Transport};
