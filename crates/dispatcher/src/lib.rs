//! 短信分发与投递跟踪核心
//!
//! - [`segmenter`]：文本分段与编码选择
//! - [`delivery_tracker`]：分段完成信号汇总
//! - [`fallback`]：IP 到电路域的回退状态机
//! - [`controller`]：对外的调度协调器
//! - [`retirement`]：超时上下文的后台回收

pub mod controller;
pub mod delivery_tracker;
pub mod fallback;
pub mod gsm_alphabet;
pub mod retirement;
pub mod segmenter;

pub use controller::*;
pub use delivery_tracker::*;
pub use fallback::*;
pub use retirement::*;
pub use segmenter::*;
