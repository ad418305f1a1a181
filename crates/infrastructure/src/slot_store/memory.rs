use async_trait::async_trait;
use sms_domain::{SlotRecord, SlotStatus, SlotStore};
use sms_errors::{SmsError, SmsResult};
use tokio::sync::RwLock;
use tracing::debug;

use super::{check_index, check_occupied_status, check_record};

/// 内存槽位存储
///
/// 写锁串行化所有变更，`read_all` 只持有读锁，可以并发执行。
#[derive(Debug)]
pub struct InMemorySlotStore {
    slots: RwLock<Vec<SlotRecord>>,
    capacity: usize,
    record_size: usize,
}

impl InMemorySlotStore {
    pub fn new(capacity: usize, record_size: usize) -> Self {
        let slots = (1..=capacity)
            .map(|index| SlotRecord::erased(index, record_size))
            .collect();
        Self {
            slots: RwLock::new(slots),
            capacity,
            record_size,
        }
    }

    pub async fn free_count(&self) -> usize {
        self.slots.read().await.iter().filter(|s| s.is_free()).count()
    }
}

#[async_trait]
impl SlotStore for InMemorySlotStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    async fn write(&self, record: &[u8], status: SlotStatus) -> SmsResult<usize> {
        check_occupied_status(status)?;
        check_record(record, self.record_size)?;
        let data = SlotRecord::pad(record, self.record_size)?;

        let mut slots = self.slots.write().await;
        let slot = slots
            .iter_mut()
            .find(|s| s.is_free())
            .ok_or(SmsError::CapacityExceeded {
                capacity: self.capacity,
            })?;

        slot.status = status;
        slot.data = data;
        debug!("槽位 {} 已写入记录，状态 {}", slot.index, status);
        Ok(slot.index)
    }

    async fn update(&self, index: usize, status: SlotStatus, record: &[u8]) -> SmsResult<()> {
        check_index(index, self.capacity)?;
        if status.is_free() {
            return self.erase(index).await;
        }
        check_record(record, self.record_size)?;
        let data = SlotRecord::pad(record, self.record_size)?;

        let mut slots = self.slots.write().await;
        let slot = &mut slots[index - 1];
        slot.status = status;
        slot.data = data;
        debug!("槽位 {} 状态更新为 {}", index, status);
        Ok(())
    }

    async fn erase(&self, index: usize) -> SmsResult<()> {
        check_index(index, self.capacity)?;
        let mut slots = self.slots.write().await;
        slots[index - 1] = SlotRecord::erased(index, self.record_size);
        debug!("槽位 {} 已擦除", index);
        Ok(())
    }

    async fn read_all(&self) -> SmsResult<Vec<SlotRecord>> {
        let slots = self.slots.read().await;
        Ok(slots.iter().filter(|s| !s.is_free()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_takes_lowest_free_slot() {
        let store = InMemorySlotStore::new(3, 8);
        assert_eq!(store.write(&[1], SlotStatus::Read).await.unwrap(), 1);
        assert_eq!(store.write(&[2], SlotStatus::Unread).await.unwrap(), 2);
        assert_eq!(store.free_count().await, 1);

        store.erase(1).await.unwrap();
        assert_eq!(store.write(&[3], SlotStatus::Sent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_with_free_status_erases() {
        let store = InMemorySlotStore::new(2, 4);
        let index = store.write(&[9, 9], SlotStatus::Unsent).await.unwrap();

        store.update(index, SlotStatus::Free, &[]).await.unwrap();
        assert!(store.read_all().await.unwrap().is_empty());
        assert_eq!(store.free_count().await, 2);
    }

    #[tokio::test]
    async fn test_write_rejects_free_status() {
        let store = InMemorySlotStore::new(2, 4);
        let err = store.write(&[1], SlotStatus::Free).await.unwrap_err();
        assert!(matches!(err, SmsError::InvalidArgument(_)));
        assert_eq!(store.free_count().await, 2);
    }

    #[tokio::test]
    async fn test_record_padded_with_erased_pattern() {
        let store = InMemorySlotStore::new(1, 4);
        store.write(&[0x07, 0x91], SlotStatus::Read).await.unwrap();
        let records = store.read_all().await.unwrap();
        assert_eq!(records[0].data, vec![0x07, 0x91, 0xFF, 0xFF]);
    }
}
