//! 设备层错误类型
//!
//! 区分致命错误（连接已不可用）和可恢复错误（超时、参数错误）。
//!
//! # 示例
//!
//! ```rust
//! use apt_device::DeviceError;
//!
//! fn handle_error(err: DeviceError) {
//!     if err.is_fatal() {
//!         eprintln!("连接已失效: {}", err);
//!     } else if err.is_retryable() {
//!         eprintln!("可重试: {}", err);
//!     }
//! }
//! ```

use apt_driver::DriverError;
use apt_protocol::ProtocolError;
use thiserror::Error;

/// 设备操作错误
#[derive(Debug, Error)]
pub enum DeviceError {
    // ==================== Fatal Errors ====================
    /// 连接已被关闭
    #[error("Not connected")]
    NotConnected,

    /// 连接丢失（拔线或 I/O 故障）
    #[error("Connection lost")]
    ConnectionLost,

    // ==================== Recoverable Errors ====================
    /// 阻塞操作等待超时
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// 操作名
        operation: &'static str,
        /// 超时时间（毫秒）
        timeout_ms: u64,
    },

    /// 不存在的 bay/通道
    #[error("Invalid address: bay {bay}, channel {channel}")]
    InvalidAddress { bay: usize, channel: usize },

    /// 设备应答内容不符合预期
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 其他驱动层错误
    #[error("Driver error: {0}")]
    Driver(#[source] DriverError),
}

impl DeviceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DeviceError::NotConnected | DeviceError::ConnectionLost)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }

    /// 把驱动层超时转换为带操作名的超时
    pub(crate) fn timeout(operation: &'static str, timeout: std::time::Duration) -> impl FnOnce(DriverError) -> Self {
        move |e| match e {
            DriverError::Timeout => DeviceError::Timeout {
                operation,
                timeout_ms: timeout.as_millis() as u64,
            },
            other => other.into(),
        }
    }
}

impl From<DriverError> for DeviceError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::NotConnected => DeviceError::NotConnected,
            DriverError::ConnectionLost => DeviceError::ConnectionLost,
            DriverError::Protocol(p) => DeviceError::Protocol(p),
            other => DeviceError::Driver(other),
        }
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, DeviceError>;
