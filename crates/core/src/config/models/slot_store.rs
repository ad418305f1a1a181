use serde::{Deserialize, Serialize};

/// 单个 ICC 短信记录的数据区长度（记录总长 176 字节，首字节为状态）
pub const DEFAULT_RECORD_SIZE: usize = 175;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStoreBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStoreConfig {
    pub backend: SlotStoreBackend,
    pub capacity: usize,
    pub record_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl Default for SlotStoreConfig {
    fn default() -> Self {
        Self {
            backend: SlotStoreBackend::Memory,
            capacity: 30,
            record_size: DEFAULT_RECORD_SIZE,
            database_url: None,
        }
    }
}

impl SlotStoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity == 0 || self.capacity > 255 {
            return Err(anyhow::anyhow!(
                "槽位容量必须在1到255之间，当前值: {}",
                self.capacity
            ));
        }

        if self.record_size == 0 {
            return Err(anyhow::anyhow!("记录长度必须大于0"));
        }

        if self.backend == SlotStoreBackend::Sqlite {
            match &self.database_url {
                Some(url) if url.starts_with("sqlite:") => {}
                Some(url) => {
                    return Err(anyhow::anyhow!("不支持的数据库URL: {}", url));
                }
                None => {
                    return Err(anyhow::anyhow!("sqlite 后端必须配置 database_url"));
                }
            }
        }

        Ok(())
    }
}
