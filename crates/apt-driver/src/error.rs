//! 驱动层错误类型定义

use apt_protocol::{EncodingError, ProtocolError};
use apt_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 串口错误
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 调用方构造了非法消息
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// 连接已被调用方关闭
    #[error("Not connected")]
    NotConnected,

    /// 读线程遇到 I/O 故障，连接已失效
    #[error("Connection lost")]
    ConnectionLost,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 内部通道已关闭（IO 线程退出）
    #[error("Event channel closed")]
    ChannelClosed,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 无效输入（如不存在的 bay/通道索引）
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DriverError {
    /// 连接是否已不可用（关闭或丢失）
    pub fn is_disconnect(&self) -> bool {
        matches!(self, DriverError::NotConnected | DriverError::ConnectionLost)
    }
}
