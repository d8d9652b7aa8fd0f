//! # APT Serial Adapter Layer
//!
//! 串口硬件抽象层。APT 控制器通过 FTDI USB 转串口芯片通信，
//! 本层只负责字节流的收发，帧的切分由协议层的 `Unpacker` 完成。
//!
//! - `port`: 基于 `serialport` 的真实串口
//! - `discovery`: 按 USB 描述符查找控制器
//! - `mock`: 内存模拟串口（feature `mock`）

use std::time::Duration;
use thiserror::Error;

pub mod discovery;
pub mod port;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use discovery::{DeviceFilter, PortCandidate, PortEnumerator, SystemPorts, find_device, list_candidates};
pub use port::{SerialPortAdapter, SerialRxAdapter, SerialTxAdapter};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockHandle, MockRx, MockSerial, MockTx};

/// 串口层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Port closed")]
    Closed,
}

impl SerialError {
    /// 是否应视为连接丢失（读线程据此退出）
    pub fn is_fatal(&self) -> bool {
        match self {
            SerialError::Timeout => false,
            SerialError::Device(e) => e.is_fatal(),
            SerialError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            SerialError::Closed => true,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    Enumeration,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NoDevice | SerialDeviceErrorKind::AccessDenied | SerialDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for SerialDeviceError {
    fn from(message: String) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for SerialDeviceError {
    fn from(message: &str) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<serialport::Error> for SerialError {
    fn from(e: serialport::Error) -> Self {
        let kind = match e.kind() {
            serialport::ErrorKind::NoDevice => SerialDeviceErrorKind::NoDevice,
            serialport::ErrorKind::InvalidInput => SerialDeviceErrorKind::UnsupportedConfig,
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => SerialDeviceErrorKind::NotFound,
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => SerialDeviceErrorKind::AccessDenied,
            _ => SerialDeviceErrorKind::Unknown,
        };
        SerialError::Device(SerialDeviceError::new(kind, e.to_string()))
    }
}

/// 流控方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowControl {
    #[default]
    None,
    /// RTS/CTS
    Hardware,
}

/// 串口参数
///
/// 默认值即 APT 控制器要求的 115200 8N1。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub flow_control: FlowControl,
    /// 单次读取的超时，决定读线程检查退出标志的频率
    pub read_timeout: Duration,
    /// 打开后拉高再拉低 RTS，并清空收发缓冲
    pub reset_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_millis(100),
            reset_on_open: true,
        }
    }
}

/// 完整的（未拆分）串口适配器
pub trait SerialAdapter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    /// 读取可用字节；超时返回 [`SerialError::Timeout`]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;

    /// 修改单次读取的超时（拆分前调用）
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError>;
}

/// 接收半边
pub trait RxAdapter {
    /// 读取可用字节；超时返回 [`SerialError::Timeout`]
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;
}

/// 发送半边
pub trait TxAdapter {
    /// 写出全部字节；单条消息必须整体写出，不能与其他消息交错
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;
}

/// 可拆分为独立收发半边的适配器
pub trait SplittableAdapter: SerialAdapter {
    type RxAdapter: RxAdapter;
    type TxAdapter: TxAdapter;
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), SerialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(!SerialError::Timeout.is_fatal());
        assert!(SerialError::Closed.is_fatal());
        assert!(SerialError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)).is_fatal());
        assert!(!SerialError::Io(std::io::Error::from(std::io::ErrorKind::Interrupted)).is_fatal());
        let busy = SerialDeviceError::new(SerialDeviceErrorKind::Busy, "in use");
        assert!(!SerialError::Device(busy).is_fatal());
    }

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.flow_control, FlowControl::None);
        assert_eq!(config.read_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_serialport_error_mapping() {
        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        match SerialError::from(e) {
            SerialError::Device(d) => {
                assert_eq!(d.kind, SerialDeviceErrorKind::NoDevice);
                assert!(d.is_fatal());
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
