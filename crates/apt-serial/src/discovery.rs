//! 控制器发现
//!
//! APT 控制器以 FTDI USB 串口的形式出现，USB 描述符中的厂商字符串为
//! `Thorlabs`、产品字符串以 `APT` 开头，序列号的前两位标识设备类型
//! （例如 TDC001 为 `83`，BBD20x 为 `73`）。

use tracing::{debug, warn};

use crate::{SerialDeviceError, SerialDeviceErrorKind, SerialError};

/// FTDI 的 USB 厂商 ID（Thorlabs 控制器使用 FTDI 芯片）
pub const FTDI_VID: u16 = 0x0403;

/// 一个候选串口
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PortCandidate {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// 串口枚举来源
///
/// 真实系统使用 [`SystemPorts`]；测试可以提供固定列表。
pub trait PortEnumerator {
    fn ports(&self) -> Result<Vec<PortCandidate>, SerialError>;
}

/// 通过 `serialport::available_ports` 枚举 USB 串口
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn ports(&self) -> Result<Vec<PortCandidate>, SerialError> {
        let ports = serialport::available_ports().map_err(|e| {
            SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::Enumeration,
                format!("failed to enumerate serial ports: {e}"),
            ))
        })?;
        Ok(ports
            .into_iter()
            .filter_map(|port| match port.port_type {
                serialport::SerialPortType::UsbPort(usb) => Some(PortCandidate {
                    port_name: port.port_name,
                    vid: usb.vid,
                    pid: usb.pid,
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                    serial_number: usb.serial_number,
                }),
                _ => None,
            })
            .collect())
    }
}

/// 匹配条件；字符串条件为前缀匹配，`None` 表示不限
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceFilter {
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

impl Default for DeviceFilter {
    /// 匹配任意 Thorlabs APT 控制器
    fn default() -> Self {
        Self {
            vid: None,
            pid: None,
            manufacturer: Some("Thorlabs".to_string()),
            product: Some("APT".to_string()),
            serial_number: None,
        }
    }
}

impl DeviceFilter {
    /// 只按序列号前缀过滤的默认条件
    pub fn with_serial_prefix(prefix: impl Into<String>) -> Self {
        Self {
            serial_number: Some(prefix.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, candidate: &PortCandidate) -> bool {
        fn prefix(pattern: &Option<String>, value: &Option<String>) -> bool {
            match (pattern, value) {
                (None, _) => true,
                (Some(p), Some(v)) => v.starts_with(p.as_str()),
                (Some(p), None) => p.is_empty(),
            }
        }
        self.vid.is_none_or(|vid| vid == candidate.vid)
            && self.pid.is_none_or(|pid| pid == candidate.pid)
            && prefix(&self.manufacturer, &candidate.manufacturer)
            && prefix(&self.product, &candidate.product)
            && prefix(&self.serial_number, &candidate.serial_number)
    }
}

/// 列出所有符合条件的串口，按端口名排序
pub fn list_candidates<E: PortEnumerator>(
    enumerator: &E,
    filter: &DeviceFilter,
) -> Result<Vec<PortCandidate>, SerialError> {
    let mut found: Vec<_> = enumerator.ports()?.into_iter().filter(|c| filter.matches(c)).collect();
    found.sort_by(|a, b| a.port_name.cmp(&b.port_name));
    debug!("{} serial port(s) match {:?}", found.len(), filter);
    Ok(found)
}

/// 返回第一个符合条件的串口
pub fn find_device<E: PortEnumerator>(enumerator: &E, filter: &DeviceFilter) -> Result<PortCandidate, SerialError> {
    let mut found = list_candidates(enumerator, filter)?;
    if found.len() > 1 {
        warn!(
            "{} devices match, using {}; set a serial number prefix to choose another",
            found.len(),
            found[0].port_name
        );
    }
    if found.is_empty() {
        return Err(SerialError::Device(SerialDeviceError::new(
            SerialDeviceErrorKind::NotFound,
            format!("no Thorlabs APT device matches {filter:?}"),
        )));
    }
    Ok(found.swap_remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPorts(Vec<PortCandidate>);

    impl PortEnumerator for FixedPorts {
        fn ports(&self) -> Result<Vec<PortCandidate>, SerialError> {
            Ok(self.0.clone())
        }
    }

    fn candidate(name: &str, serial: &str, product: &str) -> PortCandidate {
        PortCandidate {
            port_name: name.to_string(),
            vid: FTDI_VID,
            pid: 0xfaf0,
            manufacturer: Some("Thorlabs".to_string()),
            product: Some(product.to_string()),
            serial_number: Some(serial.to_string()),
        }
    }

    fn ports() -> FixedPorts {
        FixedPorts(vec![
            candidate("/dev/ttyUSB1", "83812345", "APT DC Motor Controller"),
            candidate("/dev/ttyUSB0", "73812345", "APT Brushless Motor Controller"),
            PortCandidate {
                port_name: "/dev/ttyACM0".to_string(),
                vid: 0x2341,
                pid: 0x0043,
                manufacturer: Some("Arduino".to_string()),
                product: None,
                serial_number: None,
            },
        ])
    }

    #[test]
    fn test_default_filter_matches_thorlabs_only() {
        let found = list_candidates(&ports(), &DeviceFilter::default()).unwrap();
        let names: Vec<_> = found.iter().map(|c| c.port_name.as_str()).collect();
        assert_eq!(names, vec!["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    }

    #[test]
    fn test_serial_prefix() {
        let found = find_device(&ports(), &DeviceFilter::with_serial_prefix("83")).unwrap();
        assert_eq!(found.port_name, "/dev/ttyUSB1");
    }

    #[test]
    fn test_vid_filter() {
        let filter = DeviceFilter {
            vid: Some(0x2341),
            manufacturer: None,
            product: None,
            ..DeviceFilter::default()
        };
        let found = list_candidates(&ports(), &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].port_name, "/dev/ttyACM0");
    }

    #[test]
    fn test_no_match() {
        let err = find_device(&ports(), &DeviceFilter::with_serial_prefix("27")).unwrap_err();
        assert!(matches!(err, SerialError::Device(ref e) if e.kind == SerialDeviceErrorKind::NotFound));
    }
}
