use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmsError {
    #[error("无效的参数: {0}")]
    InvalidArgument(String),
    #[error("存储槽位已满: 容量 {capacity}")]
    CapacityExceeded { capacity: usize },
    #[error("存储槽位不存在: {index}")]
    NotFound { index: usize },
    #[error("传输服务不可用: {0}")]
    TransportUnavailable(String),
    #[error("过期的关联标识: {0}")]
    StaleCorrelation(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SmsResult<T> = Result<T, SmsError>;

impl SmsError {
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
    pub fn transport_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::TransportUnavailable(msg.into())
    }
    pub fn stale<S: Into<String>>(msg: S) -> Self {
        Self::StaleCorrelation(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 可恢复的错误只记录日志，不会向调用方传播
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SmsError::StaleCorrelation(_) | SmsError::Timeout(_)
        )
    }
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            SmsError::InvalidArgument(_) | SmsError::NotFound { .. }
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            SmsError::InvalidArgument(_) => "请求参数有误",
            SmsError::CapacityExceeded { .. } => "存储空间已满",
            SmsError::NotFound { .. } => "请求的存储位置不存在",
            SmsError::TransportUnavailable(_) => "短信服务暂不可用",
            SmsError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SmsError {
    fn from(err: serde_json::Error) -> Self {
        SmsError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SmsError {
    fn from(err: anyhow::Error) -> Self {
        SmsError::Internal(err.to_string())
    }
}
