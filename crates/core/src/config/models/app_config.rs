use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatch::{FallbackConfig, SegmentationConfig, TrackingConfig},
    observability::ObservabilityConfig,
    slot_store::SlotStoreConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub segmentation: SegmentationConfig,
    pub slot_store: SlotStoreConfig,
    pub tracking: TrackingConfig,
    pub fallback: FallbackConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: SMS_, nesting separator: __)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = ConfigBuilder::builder()
            .set_default(
                "segmentation.max_user_data_octets",
                defaults.segmentation.max_user_data_octets as i64,
            )?
            .set_default(
                "segmentation.concat_header_octets",
                defaults.segmentation.concat_header_octets as i64,
            )?
            .set_default(
                "segmentation.port_header_octets",
                defaults.segmentation.port_header_octets as i64,
            )?
            .set_default("slot_store.backend", "memory")?
            .set_default("slot_store.capacity", defaults.slot_store.capacity as i64)?
            .set_default("slot_store.record_size", defaults.slot_store.record_size as i64)?
            .set_default(
                "tracking.retirement_timeout_seconds",
                defaults.tracking.retirement_timeout_seconds as i64,
            )?
            .set_default(
                "tracking.sweep_interval_seconds",
                defaults.tracking.sweep_interval_seconds as i64,
            )?
            .set_default("fallback.ims_enabled", defaults.fallback.ims_enabled)?
            .set_default("observability.log_level", defaults.observability.log_level)?
            .set_default("observability.log_format", defaults.observability.log_format)?;

        // 1. Load config file if provided
        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/sms-dispatch.toml",
                "sms-dispatch.toml",
                "/etc/sms-dispatch/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        // 2. Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("SMS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.segmentation
            .validate()
            .context("分段配置验证失败")?;

        self.slot_store
            .validate()
            .context("槽位存储配置验证失败")?;

        self.tracking.validate().context("跟踪配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
