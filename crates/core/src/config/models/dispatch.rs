use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 分段参数，单位均为字节（octet）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// 单条短信用户数据最大字节数
    pub max_user_data_octets: usize,
    /// 级联短信用户数据头占用的字节数
    pub concat_header_octets: usize,
    /// 端口寻址用户数据头占用的字节数（二进制短信）
    pub port_header_octets: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_user_data_octets: 140,
            concat_header_octets: 6,
            port_header_octets: 6,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_user_data_octets == 0 {
            return Err(anyhow::anyhow!("单条短信最大字节数必须大于0"));
        }

        // UCS2 编码下每个分段至少要能容纳一个字符
        if self.concat_header_octets + 2 > self.max_user_data_octets {
            return Err(anyhow::anyhow!(
                "级联头 {} 字节超出单条容量 {} 字节",
                self.concat_header_octets,
                self.max_user_data_octets
            ));
        }

        if self.port_header_octets >= self.max_user_data_octets {
            return Err(anyhow::anyhow!(
                "端口头 {} 字节超出单条容量 {} 字节",
                self.port_header_octets,
                self.max_user_data_octets
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    pub retirement_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            retirement_timeout_seconds: 300, // 5分钟
            sweep_interval_seconds: 30,
        }
    }
}

impl TrackingConfig {
    pub fn retirement_timeout(&self) -> Duration {
        Duration::from_secs(self.retirement_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retirement_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("跟踪上下文超时时间必须大于0"));
        }

        if self.sweep_interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// 传输层报告 IMS 可用时优先走 IP 通道
    pub ims_enabled: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { ims_enabled: true }
    }
}
