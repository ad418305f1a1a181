//! 配置管理
//!
//! 配置加载顺序：内置默认值 -> TOML 配置文件 -> 环境变量（前缀 `SMS_`，层级分隔符 `__`）。
//! 所有配置在加载后都会经过 [`AppConfig::validate`] 校验。

pub mod models;

#[cfg(test)]
mod config_test;
