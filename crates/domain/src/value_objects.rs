use std::fmt;

use serde::{Deserialize, Serialize};
use sms_errors::{SmsError, SmsResult};
use uuid::Uuid;

/// 发送结果码
///
/// 边界上的整数值与无线层约定保持一致，`Timeout` 由跟踪上下文超时回收产生，
/// 对外以通用失败码表示。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    GenericFailure,
    RadioOff,
    NullPdu,
    NoService,
    LimitExceeded,
    FdnCheckFailure,
    Timeout,
}

impl ResultCode {
    pub fn wire_code(self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::GenericFailure | ResultCode::Timeout => 1,
            ResultCode::RadioOff => 2,
            ResultCode::NullPdu => 3,
            ResultCode::NoService => 4,
            ResultCode::LimitExceeded => 5,
            ResultCode::FdnCheckFailure => 6,
        }
    }

    pub fn from_wire(code: i32) -> SmsResult<Self> {
        match code {
            0 => Ok(ResultCode::Success),
            1 => Ok(ResultCode::GenericFailure),
            2 => Ok(ResultCode::RadioOff),
            3 => Ok(ResultCode::NullPdu),
            4 => Ok(ResultCode::NoService),
            5 => Ok(ResultCode::LimitExceeded),
            6 => Ok(ResultCode::FdnCheckFailure),
            _ => Err(SmsError::invalid_argument(format!("未知的结果码: {code}"))),
        }
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Success => "success",
            ResultCode::GenericFailure => "generic_failure",
            ResultCode::RadioOff => "radio_off",
            ResultCode::NullPdu => "null_pdu",
            ResultCode::NoService => "no_service",
            ResultCode::LimitExceeded => "limit_exceeded",
            ResultCode::FdnCheckFailure => "fdn_check_failure",
            ResultCode::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ICC 短信记录状态（TS 51.011 10.5.3），数值不连续
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Free,
    Read,
    Unread,
    Sent,
    Unsent,
}

impl SlotStatus {
    pub fn wire_code(self) -> u8 {
        match self {
            SlotStatus::Free => 0,
            SlotStatus::Read => 1,
            SlotStatus::Unread => 3,
            SlotStatus::Sent => 5,
            SlotStatus::Unsent => 7,
        }
    }

    pub fn from_wire(code: i32) -> SmsResult<Self> {
        match code {
            0 => Ok(SlotStatus::Free),
            1 => Ok(SlotStatus::Read),
            3 => Ok(SlotStatus::Unread),
            5 => Ok(SlotStatus::Sent),
            7 => Ok(SlotStatus::Unsent),
            _ => Err(SmsError::invalid_argument(format!("无效的槽位状态: {code}"))),
        }
    }

    pub fn is_free(self) -> bool {
        self == SlotStatus::Free
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotStatus::Free => "free",
            SlotStatus::Read => "read",
            SlotStatus::Unread => "unread",
            SlotStatus::Sent => "sent",
            SlotStatus::Unsent => "unsent",
        };
        f.write_str(s)
    }
}

/// 一次发送请求的关联标识
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// IP 通道发出的消息引用号，用于关联运营商应用回报的结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageRef(pub i32);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransportPath {
    /// IMS / IP 通道
    Ims,
    /// 电路域通道
    Circuit,
}

impl TransportPath {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportPath::Ims => "ims",
            TransportPath::Circuit => "circuit",
        }
    }
}

/// 经 IP 通道发出、可能需要回退的消息种类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Sms,
    Mms,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Sms => "sms",
            MessageKind::Mms => "mms",
        }
    }
}

/// 注入 PDU 的格式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PduFormat {
    ThreeGpp,
    ThreeGpp2,
}

impl PduFormat {
    pub fn parse(format: &str) -> SmsResult<Self> {
        match format {
            "3gpp" => Ok(PduFormat::ThreeGpp),
            "3gpp2" => Ok(PduFormat::ThreeGpp2),
            _ => Err(SmsError::invalid_argument(format!(
                "PDU 格式必须是 3gpp 或 3gpp2: {format}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PduFormat::ThreeGpp => "3gpp",
            PduFormat::ThreeGpp2 => "3gpp2",
        }
    }
}

/// 整条消息共用的编码方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// GSM 7-bit 默认字母表
    Gsm7,
    /// UCS-2 / UTF-16 宽字符
    Ucs2,
    /// 8-bit 二进制数据
    Binary,
}
