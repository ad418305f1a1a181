use std::str::FromStr;

use async_trait::async_trait;
use sms_domain::{SlotRecord, SlotStatus, SlotStore};
use sms_errors::{SmsError, SmsResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{check_index, check_occupied_status, check_record};

/// 基于 SQLite 的槽位存储
///
/// 每个槽位对应 `icc_slots` 表中的一行，初始化时全部创建为 Free。
/// 变更在事务中完成并提交后才返回，互斥锁保证变更之间的全序。
pub struct SqliteSlotStore {
    pool: SqlitePool,
    capacity: usize,
    record_size: usize,
    write_lock: Mutex<()>,
}

impl SqliteSlotStore {
    /// 连接数据库并初始化槽位表
    pub async fn connect(database_url: &str, capacity: usize, record_size: usize) -> SmsResult<Self> {
        debug!("连接 SQLite 槽位存储: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存数据库每个连接各自独立，只能使用单连接
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .min_connections(1)
            .connect_with(connect_options)
            .await?;

        Self::with_pool(pool, capacity, record_size).await
    }

    pub async fn with_pool(pool: SqlitePool, capacity: usize, record_size: usize) -> SmsResult<Self> {
        let store = Self {
            pool,
            capacity,
            record_size,
            write_lock: Mutex::new(()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> SmsResult<()> {
        debug!("初始化槽位表");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS icc_slots (
                slot_index INTEGER PRIMARY KEY,
                status INTEGER NOT NULL DEFAULT 0,
                data BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // 已存在的槽位保持原样，只补齐缺少的行
        let erased = SlotRecord::erased_pattern(self.record_size);
        let mut tx = self.pool.begin().await?;
        for index in 1..=self.capacity {
            sqlx::query("INSERT OR IGNORE INTO icc_slots (slot_index, status, data) VALUES ($1, 0, $2)")
                .bind(index as i64)
                .bind(&erased)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> SmsResult<SlotRecord> {
        let index: i64 = row.try_get("slot_index")?;
        let status: i64 = row.try_get("status")?;
        let data: Vec<u8> = row.try_get("data")?;
        let status = SlotStatus::from_wire(status as i32)
            .map_err(|_| SmsError::Internal(format!("槽位 {index} 的状态值 {status} 已损坏")))?;
        Ok(SlotRecord {
            index: index as usize,
            status,
            data,
        })
    }
}

#[async_trait]
impl SlotStore for SqliteSlotStore {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    #[instrument(skip(self, record))]
    async fn write(&self, record: &[u8], status: SlotStatus) -> SmsResult<usize> {
        check_occupied_status(status)?;
        check_record(record, self.record_size)?;
        let data = SlotRecord::pad(record, self.record_size)?;

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let free: Option<i64> = sqlx::query_scalar(
            "SELECT slot_index FROM icc_slots WHERE status = 0 AND slot_index <= $1 ORDER BY slot_index LIMIT 1",
        )
        .bind(self.capacity as i64)
        .fetch_optional(&mut *tx)
        .await?;

        let index = free.ok_or(SmsError::CapacityExceeded {
            capacity: self.capacity,
        })?;

        sqlx::query("UPDATE icc_slots SET status = $1, data = $2 WHERE slot_index = $3")
            .bind(status.wire_code() as i64)
            .bind(&data)
            .bind(index)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("槽位 {} 已写入记录", index);
        Ok(index as usize)
    }

    #[instrument(skip(self, record))]
    async fn update(&self, index: usize, status: SlotStatus, record: &[u8]) -> SmsResult<()> {
        check_index(index, self.capacity)?;
        if status.is_free() {
            return self.erase(index).await;
        }
        check_record(record, self.record_size)?;
        let data = SlotRecord::pad(record, self.record_size)?;

        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE icc_slots SET status = $1, data = $2 WHERE slot_index = $3")
            .bind(status.wire_code() as i64)
            .bind(&data)
            .bind(index as i64)
            .execute(&self.pool)
            .await?;

        debug!("槽位 {} 已更新", index);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn erase(&self, index: usize) -> SmsResult<()> {
        check_index(index, self.capacity)?;

        let _guard = self.write_lock.lock().await;
        sqlx::query("UPDATE icc_slots SET status = 0, data = $1 WHERE slot_index = $2")
            .bind(SlotRecord::erased_pattern(self.record_size))
            .bind(index as i64)
            .execute(&self.pool)
            .await?;

        debug!("槽位 {} 已擦除", index);
        Ok(())
    }

    async fn read_all(&self) -> SmsResult<Vec<SlotRecord>> {
        let rows = sqlx::query(
            "SELECT slot_index, status, data FROM icc_slots WHERE status != 0 AND slot_index <= $1 ORDER BY slot_index",
        )
        .bind(self.capacity as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store(capacity: usize) -> SqliteSlotStore {
        SqliteSlotStore::connect("sqlite::memory:", capacity, 16)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_slots_created_free() {
        let store = memory_store(3).await;
        assert!(store.read_all().await.unwrap().is_empty());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM icc_slots")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_write_update_erase() {
        let store = memory_store(2).await;
        let index = store.write(&[0x01, 0x02], SlotStatus::Unread).await.unwrap();
        assert_eq!(index, 1);

        store.update(index, SlotStatus::Read, &[0x03]).await.unwrap();
        let records = store.read_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, SlotStatus::Read);
        assert_eq!(records[0].data[0], 0x03);
        assert_eq!(records[0].data.len(), 16);

        store.erase(index).await.unwrap();
        store.erase(index).await.unwrap();
        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_index() {
        let store = memory_store(2).await;
        let err = store.update(3, SlotStatus::Read, &[1]).await.unwrap_err();
        assert!(matches!(err, SmsError::NotFound { index: 3 }));
        let err = store.erase(0).await.unwrap_err();
        assert!(matches!(err, SmsError::NotFound { index: 0 }));
    }
}
