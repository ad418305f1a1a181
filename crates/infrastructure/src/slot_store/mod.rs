//! 槽位存储实现
//!
//! `memory` 用于测试和无持久化需求的部署，`sqlite` 在每次变更返回前提交事务。

pub mod memory;
pub mod sqlite;

pub use memory::InMemorySlotStore;
pub use sqlite::SqliteSlotStore;

use std::sync::Arc;

use sms_core::{SlotStoreBackend, SlotStoreConfig};
use sms_domain::{SlotStatus, SlotStore};
use sms_errors::{SmsError, SmsResult};
use tracing::info;

/// 根据配置创建槽位存储
pub async fn create_slot_store(config: &SlotStoreConfig) -> SmsResult<Arc<dyn SlotStore>> {
    match config.backend {
        SlotStoreBackend::Memory => {
            info!("创建内存槽位存储，容量 {}", config.capacity);
            Ok(Arc::new(InMemorySlotStore::new(
                config.capacity,
                config.record_size,
            )))
        }
        SlotStoreBackend::Sqlite => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| SmsError::config_error("sqlite 槽位存储缺少 database_url"))?;
            info!(
                "创建 SQLite 槽位存储 {}，容量 {}",
                url, config.capacity
            );
            let store = SqliteSlotStore::connect(url, config.capacity, config.record_size).await?;
            Ok(Arc::new(store))
        }
    }
}

/// 写入前的公共校验
pub(crate) fn check_record(record: &[u8], record_size: usize) -> SmsResult<()> {
    if record.is_empty() {
        return Err(SmsError::invalid_argument("记录内容不能为空"));
    }
    if record.len() > record_size {
        return Err(SmsError::invalid_argument(format!(
            "记录长度 {} 超过槽位大小 {}",
            record.len(),
            record_size
        )));
    }
    Ok(())
}

pub(crate) fn check_index(index: usize, capacity: usize) -> SmsResult<()> {
    if index == 0 || index > capacity {
        return Err(SmsError::NotFound { index });
    }
    Ok(())
}

pub(crate) fn check_occupied_status(status: SlotStatus) -> SmsResult<()> {
    if status.is_free() {
        return Err(SmsError::invalid_argument("写入记录的状态不能为 Free"));
    }
    Ok(())
}
