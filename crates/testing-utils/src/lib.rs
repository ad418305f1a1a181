//! # SMS Testing Utils
//!
//! 短信分发工作区共用的测试工具。
//!
//! - **传输层模拟**：记录每个分发请求，由测试手动触发完成回调
//! - **消息库模拟**：外部持久化消息库的内存替身
//! - **测试数据构建器**：发送请求与完成令牌
//!
//! ```toml
//! [dev-dependencies]
//! sms-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
