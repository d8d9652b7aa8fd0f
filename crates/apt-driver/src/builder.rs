//! Builder 模式实现
//!
//! 提供链式构造 [`AptConnection`] 的便捷方式。

use apt_protocol::EndPoint;
use apt_serial::{DeviceFilter, SerialConfig, SerialPortAdapter, SplittableAdapter, SystemPorts, find_device};
use tracing::info;

use crate::connection::AptConnection;
use crate::error::DriverError;
use crate::pipeline::PipelineConfig;
use crate::state::Addressing;

/// 连接 Builder（链式构造）
///
/// 未指定串口路径时，按 [`DeviceFilter`] 在系统 USB 串口中查找控制器。
///
/// # Example
///
/// ```no_run
/// use apt_driver::{Addressing, ConnectionBuilder};
/// use apt_protocol::EndPoint;
///
/// // 指定串口
/// let connection = ConnectionBuilder::new()
///     .port("/dev/ttyUSB0")
///     .build()
///     .unwrap();
///
/// // 按序列号前缀查找三插槽机架
/// let rack = ConnectionBuilder::new()
///     .serial_prefix("73")
///     .controller(EndPoint::Rack)
///     .addressing(Addressing::rack(3))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    /// 串口路径（如 "/dev/ttyUSB0" 或 "COM3"）
    port: Option<String>,
    filter: DeviceFilter,
    serial_config: SerialConfig,
    pipeline_config: PipelineConfig,
    controller: EndPoint,
    addressing: Addressing,
}

impl ConnectionBuilder {
    /// 默认：单通道 USB 控制器、自动查找、115200 8N1
    pub fn new() -> Self {
        Self {
            port: None,
            filter: DeviceFilter::default(),
            serial_config: SerialConfig::default(),
            pipeline_config: PipelineConfig::default(),
            controller: EndPoint::Usb,
            addressing: Addressing::usb(),
        }
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// 自动查找时使用的序列号前缀
    pub fn serial_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.filter.serial_number = Some(prefix.into());
        self
    }

    pub fn filter(mut self, filter: DeviceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.serial_config = config;
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = config;
        self
    }

    pub fn controller(mut self, controller: EndPoint) -> Self {
        self.controller = controller;
        self
    }

    pub fn addressing(mut self, addressing: Addressing) -> Self {
        self.addressing = addressing;
        self
    }

    /// 打开串口并启动连接
    ///
    /// # Errors
    /// - `DriverError::Serial`: 找不到设备或串口打开失败
    pub fn build(self) -> Result<AptConnection, DriverError> {
        let port = match &self.port {
            Some(port) => port.clone(),
            None => {
                let candidate = find_device(&SystemPorts, &self.filter)?;
                info!(
                    "Found {} (serial {})",
                    candidate.port_name,
                    candidate.serial_number.as_deref().unwrap_or("?")
                );
                candidate.port_name
            },
        };

        let adapter = SerialPortAdapter::open(&port, &self.serial_config)?;
        self.build_with(adapter)
    }

    /// 在给定的适配器上启动连接（测试中配合模拟串口使用）
    pub fn build_with<A>(self, adapter: A) -> Result<AptConnection, DriverError>
    where
        A: SplittableAdapter,
        A::RxAdapter: Send + 'static,
        A::TxAdapter: Send + 'static,
    {
        AptConnection::start(adapter, self.controller, self.addressing, self.pipeline_config)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apt_serial::MockSerial;

    #[test]
    fn test_builder_with_mock() {
        let (serial, handle) = MockSerial::new();
        let connection = ConnectionBuilder::new()
            .controller(EndPoint::Rack)
            .addressing(Addressing::rack(2))
            .pipeline_config(PipelineConfig {
                keepalive_interval: None,
                ..PipelineConfig::default()
            })
            .build_with(serial)
            .unwrap();
        assert_eq!(connection.controller(), EndPoint::Rack);
        assert_eq!(connection.statuses().len(), 2);
        // 每个插槽一条 HW_START_UPDATEMSGS
        assert_eq!(handle.written().len(), 12);
    }

    #[test]
    fn test_build_missing_port_fails() {
        let result = ConnectionBuilder::new().port("/dev/does-not-exist-apt").build();
        assert!(matches!(result, Err(DriverError::Serial(_))));
    }
}
