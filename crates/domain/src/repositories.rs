//! 槽位存储抽象

use async_trait::async_trait;
use sms_errors::SmsResult;

use crate::entities::SlotRecord;
use crate::value_objects::SlotStatus;

/// 固定容量的记录存储（ICC 短信区）
///
/// 所有变更操作相互串行，并在返回成功前落盘；`read_all` 可以并发执行，
/// 只返回非空闲槽位，按索引升序排列。索引从1开始。
#[async_trait]
pub trait SlotStore: Send + Sync {
    fn capacity(&self) -> usize;

    fn record_size(&self) -> usize;

    /// 占用索引最小的空闲槽位，返回其索引
    async fn write(&self, record: &[u8], status: SlotStatus) -> SmsResult<usize>;

    /// 原子地覆盖指定槽位的内容与状态
    async fn update(&self, index: usize, status: SlotStatus, record: &[u8]) -> SmsResult<()>;

    /// 置为空闲并写入擦除模式，幂等
    async fn erase(&self, index: usize) -> SmsResult<()>;

    async fn read_all(&self) -> SmsResult<Vec<SlotRecord>>;
}
