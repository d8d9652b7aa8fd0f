//! 反馈消息解析
//!
//! 状态类消息的字段名在布局表中是统一的（`position`、`velocity`、
//! `encoder_count`、`status_bits`），因此 [`StatusUpdate`] 按字段名提取，
//! 消息中没有的字段保持 `None`，由状态存储按字段合并。

use crate::endpoint::EndPoint;
use crate::ids::MessageId;
use crate::message::{Message, Value};
use crate::status::StatusBits;
use crate::ProtocolError;

/// 一条状态类消息携带的运动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    pub kind: MessageId,
    pub source: EndPoint,
    pub chan_ident: u16,
    pub position: Option<i32>,
    pub velocity: Option<i32>,
    pub encoder_count: Option<i32>,
    pub status_bits: Option<StatusBits>,
}

impl StatusUpdate {
    /// 解析状态类消息；其他消息返回 `None`
    pub fn from_message(message: &Message) -> Option<Self> {
        let kind = message.kind().filter(|k| k.is_status())?;
        let i32_field = |name: &str| message.field_i64(name).and_then(|v| i32::try_from(v).ok());
        Some(Self {
            kind,
            source: message.source,
            chan_ident: message.chan_ident()?,
            position: i32_field("position"),
            velocity: i32_field("velocity"),
            encoder_count: i32_field("encoder_count"),
            status_bits: message
                .field_i64("status_bits")
                .and_then(|v| u32::try_from(v).ok())
                .map(StatusBits::from_raw),
        })
    }
}

/// 设备上报的错误（`HW_RESPONSE` / `HW_RICHRESPONSE`）
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorReport {
    pub source: EndPoint,
    /// 引发错误的消息 ID；`HW_RESPONSE` 不携带，记为 0
    pub msgid: u16,
    /// 错误码；`HW_RESPONSE` 不携带，记为 -1
    pub code: i32,
    pub notes: String,
}

impl ErrorReport {
    pub fn from_message(message: &Message) -> Option<Self> {
        match message.kind()? {
            MessageId::HwResponse => Some(Self {
                source: message.source,
                msgid: 0,
                code: -1,
                notes: "unknown".to_string(),
            }),
            MessageId::HwRichResponse => Some(Self {
                source: message.source,
                msgid: u16::try_from(message.field_i64("msgid")?).ok()?,
                code: i32::try_from(message.field_i64("code")?).ok()?,
                notes: message.field("notes")?.as_str()?.to_string(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "device error from {}: msgid=0x{:04X} code={} notes={:?}",
            self.source, self.msgid, self.code, self.notes
        )
    }
}

/// 硬件信息（`HW_GET_INFO`）
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HardwareInfo {
    pub source: EndPoint,
    pub serial_number: u32,
    pub model_number: String,
    pub hw_type: u16,
    /// `[minor, interim, major]`
    pub firmware: [u8; 3],
    pub notes: String,
    pub hw_version: u16,
    pub mod_state: u16,
    /// 通道数
    pub nchs: u16,
}

impl HardwareInfo {
    /// 固件版本（major.interim.minor）
    pub fn firmware_version(&self) -> semver::Version {
        let [minor, interim, major] = self.firmware;
        semver::Version::new(major.into(), interim.into(), minor.into())
    }
}

impl TryFrom<&Message> for HardwareInfo {
    type Error = ProtocolError;

    fn try_from(message: &Message) -> Result<Self, Self::Error> {
        if message.kind() != Some(MessageId::HwGetInfo) {
            return Err(ProtocolError::UnexpectedMessage {
                expected: MessageId::HwGetInfo,
                actual: message.id,
            });
        }
        let missing = |field: &'static str| ProtocolError::MissingField {
            message: "HW_GET_INFO",
            field,
        };
        let int = |field: &'static str| message.field_i64(field).ok_or_else(|| missing(field));
        let text = |field: &'static str| {
            message
                .field(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| missing(field))
        };
        let firmware: [u8; 3] = message
            .field("firmware_version")
            .and_then(Value::as_bytes)
            .and_then(|b| b.get(..3))
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| missing("firmware_version"))?;

        Ok(Self {
            source: message.source,
            serial_number: int("serial_number")? as u32,
            model_number: text("model_number")?,
            hw_type: int("hw_type")? as u16,
            firmware,
            notes: text("notes")?,
            hw_version: int("hw_version")? as u16,
            mod_state: int("mod_state")? as u16,
            nchs: int("nchs")? as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    fn info_message() -> Message {
        Message::new(
            MessageId::HwGetInfo,
            EndPoint::Host,
            EndPoint::Usb,
            [
                Value::U32(83_000_123),
                Value::from("TDC001"),
                Value::U16(16),
                Value::Bytes(vec![4, 2, 1, 0]),
                Value::from("APT DC Motor Controller"),
                Value::Bytes(vec![0; 12]),
                Value::U16(1),
                Value::U16(0),
                Value::U16(1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_hardware_info() {
        let (msg, _) = decode(&encode(&info_message()).unwrap()).unwrap();
        let info = HardwareInfo::try_from(&msg).unwrap();
        assert_eq!(info.serial_number, 83_000_123);
        assert_eq!(info.model_number, "TDC001");
        assert_eq!(info.notes, "APT DC Motor Controller");
        assert_eq!(info.firmware_version(), semver::Version::new(1, 2, 4));
        assert_eq!(info.nchs, 1);
    }

    #[test]
    fn test_hardware_info_wrong_message() {
        let msg = crate::commands::hw_req_info(EndPoint::Usb);
        assert!(matches!(
            HardwareInfo::try_from(&msg),
            Err(ProtocolError::UnexpectedMessage { .. })
        ));
    }

    #[test]
    fn test_error_report_plain() {
        let msg = Message::new(MessageId::HwResponse, EndPoint::Host, EndPoint::Bay1, []).unwrap();
        let report = ErrorReport::from_message(&msg).unwrap();
        assert_eq!(report.msgid, 0);
        assert_eq!(report.code, -1);
        assert_eq!(report.notes, "unknown");
        assert_eq!(report.source, EndPoint::Bay1);
    }

    #[test]
    fn test_error_report_rich() {
        let msg = Message::new(
            MessageId::HwRichResponse,
            EndPoint::Host,
            EndPoint::Usb,
            [Value::U16(0x0443), Value::U16(12), Value::from("motor not homed")],
        )
        .unwrap();
        let report = ErrorReport::from_message(&msg).unwrap();
        assert_eq!(report.msgid, 0x0443);
        assert_eq!(report.code, 12);
        assert_eq!(report.notes, "motor not homed");
    }

    #[test]
    fn test_status_update_fields_by_kind() {
        let stepper = Message::new(
            MessageId::MotGetStatusUpdate,
            EndPoint::Host,
            EndPoint::Bay0,
            [Value::U16(1), Value::I32(100), Value::I32(98), Value::U32(1 << 10)],
        )
        .unwrap();
        let update = StatusUpdate::from_message(&stepper).unwrap();
        assert_eq!(update.position, Some(100));
        assert_eq!(update.encoder_count, Some(98));
        assert_eq!(update.velocity, None);
        assert!(update.status_bits.is_some_and(|b| b.homed()));

        let counter = Message::new(
            MessageId::MotGetPosCounter,
            EndPoint::Host,
            EndPoint::Usb,
            [Value::U16(1), Value::I32(-5)],
        )
        .unwrap();
        let update = StatusUpdate::from_message(&counter).unwrap();
        assert_eq!(update.position, Some(-5));
        assert_eq!(update.status_bits, None);
    }
}
