//! # APT Protocol
//!
//! Thorlabs APT 二进制协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `endpoint`: 端点地址
//! - `ids`: 消息 ID
//! - `layout`: 消息布局表（编解码器由此表驱动）
//! - `message`: 消息与字段值
//! - `codec`: 单帧编解码
//! - `unpacker`: 流式解包（失步后逐字节重同步）
//! - `status`: 32 位状态字
//! - `commands`: 指令构建
//! - `params`: 运动参数块
//! - `feedback`: 反馈消息解析
//!
//! ## 字节序
//!
//! 协议中的多字节整数均为小端字节序（LSB first）。

pub mod codec;
pub mod commands;
pub mod endpoint;
pub mod feedback;
pub mod ids;
pub mod layout;
pub mod message;
pub mod params;
pub mod status;
pub mod unpacker;

// 重新导出常用类型
pub use codec::{DEFAULT_MAX_DECODE_BODY, HEADER_LEN, decode, decode_with_limit, encode, encode_into};
pub use commands::{Direction, EnableState, JogMode, StopMode};
pub use endpoint::EndPoint;
pub use feedback::{ErrorReport, HardwareInfo, StatusUpdate};
pub use ids::MessageId;
pub use layout::{FieldKind, FieldSpec, Form, MessageLayout};
pub use message::{Fields, Message, MessageData, RawPayload, Value};
pub use params::{HomeParams, JogParams, ParamsUpdate, VelocityParams};
pub use status::{StatusBits, StatusFlags};
pub use unpacker::Unpacker;

use thiserror::Error;

/// 长帧消息体的最大长度（`data_length` 是 16 位）
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// 编码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Message body too long: {len} bytes (max 65535)")]
    BodyTooLong { len: usize },

    #[error("No layout for message id 0x{id:04X}")]
    UnknownId { id: u16 },

    #[error("{name}: expected {expected} fields, got {actual}")]
    FieldCount {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name}: field `{field}` does not fit {kind:?}")]
    FieldMismatch {
        name: &'static str,
        field: &'static str,
        kind: FieldKind,
    },
}

/// 头部不合法的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFault {
    /// 目标地址（去掉长帧标志后）不是已知端点
    Destination(u8),
    /// 源地址不是已知端点
    Source(u8),
    /// 长帧消息体超过解码上限
    BodyTooLong(usize),
}

/// 解码错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// 数据不足一帧
    #[error("Incomplete frame: {needed} more bytes needed")]
    Incomplete { needed: usize },

    /// 头部不合法，需要重新同步
    #[error("Invalid header: {0:?}")]
    InvalidHeader(HeaderFault),
}

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodeError),

    #[error("{message}: missing field `{field}`")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    #[error("Unexpected message: expected {expected:?}, got 0x{actual:04X}")]
    UnexpectedMessage { expected: MessageId, actual: u16 },
}
