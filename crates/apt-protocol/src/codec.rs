//! 帧编解码
//!
//! 头部固定 6 字节，小端字节序：
//!
//! ```text
//! 短帧: | id (u16) | param1 | param2 | dest        | source |
//! 长帧: | id (u16) | data_length (u16) | dest | 0x80 | source | body ... |
//! ```
//!
//! 解码器只根据头部判断帧边界；端点地址不合法的头部视为失步，
//! 由调用方逐字节丢弃后重试（见 [`crate::Unpacker`]）。

use bytes::{Buf, BufMut};

use crate::endpoint::{EndPoint, LONG_FORM_FLAG};
use crate::layout::{FieldKind, Form, MessageLayout, layout};
use crate::message::{Fields, Message, MessageData, RawPayload, Value};
use crate::{DecodeError, EncodingError, HeaderFault, MAX_BODY_LEN};

/// 头部长度
pub const HEADER_LEN: usize = 6;

/// 解码时接受的最大消息体长度
///
/// 协议允许最长 65535 字节的消息体，但实际设备上报的消息都在几百字节以内。
/// 限制长度可以避免一个错位的头部让解码器长时间等待不存在的数据。
pub const DEFAULT_MAX_DECODE_BODY: usize = 1024;

/// 编码为新分配的字节序列
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::with_capacity(HEADER_LEN + encoded_body_len(message));
    encode_into(message, &mut out)?;
    Ok(out)
}

/// 编码并追加到 `out`，返回写入的字节数
pub fn encode_into<B: BufMut>(message: &Message, out: &mut B) -> Result<usize, EncodingError> {
    message.validate()?;

    let dest = message.dest.address();
    let source = message.source.address();

    match &message.data {
        MessageData::Raw(RawPayload::Params(params)) => {
            put_short_header(out, message.id, *params, dest, source);
            Ok(HEADER_LEN)
        },
        MessageData::Raw(RawPayload::Body(body)) => {
            put_long_header(out, message.id, body.len(), dest, source)?;
            out.put_slice(body);
            Ok(HEADER_LEN + body.len())
        },
        MessageData::Fields(fields) => {
            let entry = layout(message.id).ok_or(EncodingError::UnknownId { id: message.id })?;
            match entry.form {
                Form::Short => {
                    let mut params = [0u8; 2];
                    for (slot, value) in params.iter_mut().zip(fields.iter()) {
                        if let Value::U8(v) = value {
                            *slot = *v;
                        }
                    }
                    put_short_header(out, message.id, params, dest, source);
                    Ok(HEADER_LEN)
                },
                Form::Long => {
                    let body_len = entry.body_len();
                    put_long_header(out, message.id, body_len, dest, source)?;
                    for (spec, value) in entry.fields.iter().zip(fields.iter()) {
                        put_value(out, spec.kind, value);
                    }
                    Ok(HEADER_LEN + body_len)
                },
            }
        },
    }
}

/// 解码一帧，返回消息与消耗的字节数
///
/// - 不足一帧：[`DecodeError::Incomplete`]，调用方应等待更多数据
/// - 头部不合法：[`DecodeError::InvalidHeader`]，调用方应丢弃一个字节后重试
pub fn decode(buf: &[u8]) -> Result<(Message, usize), DecodeError> {
    decode_with_limit(buf, DEFAULT_MAX_DECODE_BODY)
}

/// 同 [`decode`]，可指定最大消息体长度
pub fn decode_with_limit(buf: &[u8], max_body: usize) -> Result<(Message, usize), DecodeError> {
    if buf.len() < HEADER_LEN {
        return Err(DecodeError::Incomplete {
            needed: HEADER_LEN - buf.len(),
        });
    }

    let id = u16::from_le_bytes([buf[0], buf[1]]);
    let dest_byte = buf[4];
    let dest = EndPoint::from_dest_byte(dest_byte)
        .ok_or(DecodeError::InvalidHeader(HeaderFault::Destination(dest_byte)))?;
    let source =
        EndPoint::try_from(buf[5]).map_err(|_| DecodeError::InvalidHeader(HeaderFault::Source(buf[5])))?;

    if dest_byte & LONG_FORM_FLAG == 0 {
        let params = [buf[2], buf[3]];
        let data = match layout(id) {
            Some(entry) if entry.form == Form::Short => MessageData::Fields(short_fields(entry, params)),
            _ => MessageData::Raw(RawPayload::Params(params)),
        };
        return Ok((Message { id, dest, source, data }, HEADER_LEN));
    }

    let body_len = usize::from(u16::from_le_bytes([buf[2], buf[3]]));
    if body_len > max_body {
        return Err(DecodeError::InvalidHeader(HeaderFault::BodyTooLong(body_len)));
    }
    let total = HEADER_LEN + body_len;
    if buf.len() < total {
        return Err(DecodeError::Incomplete {
            needed: total - buf.len(),
        });
    }

    let body = &buf[HEADER_LEN..total];
    let data = match layout(id) {
        Some(entry) if entry.form == Form::Long && entry.body_len() == body_len => {
            MessageData::Fields(long_fields(entry, body))
        },
        // 布局不符时仍按原始消息透传，帧边界本身是可信的
        _ => MessageData::Raw(RawPayload::Body(body.to_vec())),
    };
    Ok((Message { id, dest, source, data }, total))
}

fn encoded_body_len(message: &Message) -> usize {
    match &message.data {
        MessageData::Raw(RawPayload::Body(body)) => body.len(),
        MessageData::Raw(RawPayload::Params(_)) => 0,
        MessageData::Fields(_) => message.layout().map_or(0, MessageLayout::body_len),
    }
}

fn put_short_header<B: BufMut>(out: &mut B, id: u16, params: [u8; 2], dest: u8, source: u8) {
    out.put_u16_le(id);
    out.put_slice(&params);
    out.put_u8(dest);
    out.put_u8(source);
}

fn put_long_header<B: BufMut>(
    out: &mut B,
    id: u16,
    body_len: usize,
    dest: u8,
    source: u8,
) -> Result<(), EncodingError> {
    if body_len > MAX_BODY_LEN {
        return Err(EncodingError::BodyTooLong { len: body_len });
    }
    out.put_u16_le(id);
    out.put_u16_le(body_len as u16);
    out.put_u8(dest | LONG_FORM_FLAG);
    out.put_u8(source);
    Ok(())
}

fn put_value<B: BufMut>(out: &mut B, kind: FieldKind, value: &Value) {
    match value {
        Value::U8(v) => out.put_u8(*v),
        Value::U16(v) => out.put_u16_le(*v),
        Value::I16(v) => out.put_i16_le(*v),
        Value::U32(v) => out.put_u32_le(*v),
        Value::I32(v) => out.put_i32_le(*v),
        Value::Text(s) => {
            out.put_slice(s.as_bytes());
            out.put_bytes(0, kind.width() - s.len());
        },
        Value::Bytes(b) => out.put_slice(b),
    }
}

fn short_fields(entry: &MessageLayout, params: [u8; 2]) -> Fields {
    entry.fields.iter().zip(params).map(|(_, p)| Value::U8(p)).collect()
}

/// 调用前已保证 `body.len() == entry.body_len()`
fn long_fields(entry: &MessageLayout, mut body: &[u8]) -> Fields {
    let mut fields = Fields::new();
    for spec in entry.fields {
        let value = match spec.kind {
            FieldKind::U8 => Value::U8(body.get_u8()),
            FieldKind::U16 => Value::U16(body.get_u16_le()),
            FieldKind::I16 => Value::I16(body.get_i16_le()),
            FieldKind::U32 => Value::U32(body.get_u32_le()),
            FieldKind::I32 => Value::I32(body.get_i32_le()),
            FieldKind::Text(n) => {
                let raw = &body[..n];
                let end = raw.iter().position(|b| *b == 0).unwrap_or(n);
                let text = String::from_utf8_lossy(&raw[..end]).into_owned();
                body.advance(n);
                Value::Text(text)
            },
            FieldKind::Bytes(n) => {
                let raw = body[..n].to_vec();
                body.advance(n);
                Value::Bytes(raw)
            },
        };
        fields.0.push(value);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::MessageId;

    #[test]
    fn test_encode_short_form() {
        let msg = Message::new(MessageId::MotMoveHome, EndPoint::Bay1, EndPoint::Host, [Value::U8(1)]).unwrap();
        assert_eq!(encode(&msg).unwrap(), vec![0x43, 0x04, 0x01, 0x00, 0x22, 0x01]);
    }

    #[test]
    fn test_encode_long_form() {
        let msg = Message::new(
            MessageId::MotMoveAbsolute,
            EndPoint::Usb,
            EndPoint::Host,
            [Value::U16(1), Value::I32(0x0001_0203)],
        )
        .unwrap();
        assert_eq!(
            encode(&msg).unwrap(),
            vec![0x53, 0x04, 0x06, 0x00, 0xD0, 0x01, 0x01, 0x00, 0x03, 0x02, 0x01, 0x00]
        );
    }

    #[test]
    fn test_decode_dc_status_update() {
        // MOT_GET_DCSTATUSUPDATE from BAY0: chan 1, pos -100, vel 7, status 0x80000400
        let mut frame = vec![0x91, 0x04, 0x0E, 0x00, 0x81, 0x21];
        frame.extend_from_slice(&1u16.to_le_bytes());
        frame.extend_from_slice(&(-100i32).to_le_bytes());
        frame.extend_from_slice(&7i16.to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.extend_from_slice(&0x8000_0400u32.to_le_bytes());

        let (msg, used) = decode(&frame).unwrap();
        assert_eq!(used, 20);
        assert_eq!(msg.kind(), Some(MessageId::MotGetDcStatusUpdate));
        assert_eq!(msg.source, EndPoint::Bay0);
        assert_eq!(msg.dest, EndPoint::Host);
        assert_eq!(msg.field_i64("position"), Some(-100));
        assert_eq!(msg.field_i64("velocity"), Some(7));
        assert_eq!(msg.field_i64("status_bits"), Some(0x8000_0400));
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(decode(&[0x43, 0x04]).unwrap_err(), DecodeError::Incomplete { needed: 4 });
        let header = [0x53, 0x04, 0x06, 0x00, 0xD0, 0x01, 0x01];
        assert_eq!(decode(&header).unwrap_err(), DecodeError::Incomplete { needed: 5 });
    }

    #[test]
    fn test_decode_invalid_endpoints() {
        assert_eq!(
            decode(&[0x43, 0x04, 0x01, 0x00, 0x02, 0x01]).unwrap_err(),
            DecodeError::InvalidHeader(HeaderFault::Destination(0x02))
        );
        assert_eq!(
            decode(&[0x43, 0x04, 0x01, 0x00, 0x22, 0x33]).unwrap_err(),
            DecodeError::InvalidHeader(HeaderFault::Source(0x33))
        );
    }

    #[test]
    fn test_decode_body_limit() {
        let header = [0x00, 0x77, 0xFF, 0xFF, 0x81, 0x50];
        assert_eq!(
            decode(&header).unwrap_err(),
            DecodeError::InvalidHeader(HeaderFault::BodyTooLong(0xFFFF))
        );
        assert!(matches!(
            decode_with_limit(&header, MAX_BODY_LEN).unwrap_err(),
            DecodeError::Incomplete { .. }
        ));
    }

    #[test]
    fn test_unknown_id_passthrough() {
        let frame = [0x34, 0x12, 0x03, 0x00, 0x81, 0x50, 0xAA, 0xBB, 0xCC];
        let (msg, used) = decode(&frame).unwrap();
        assert_eq!(used, 9);
        assert_eq!(msg.id, 0x1234);
        assert_eq!(msg.data, MessageData::Raw(RawPayload::Body(vec![0xAA, 0xBB, 0xCC])));
        assert_eq!(encode(&msg).unwrap(), frame.to_vec());
    }

    #[test]
    fn test_known_id_with_unexpected_length_is_raw() {
        // MOT_GET_STATUSUPDATE 的 20 字节变体
        let mut frame = vec![0x81, 0x04, 0x14, 0x00, 0x81, 0x50];
        frame.extend_from_slice(&[0u8; 20]);
        let (msg, used) = decode(&frame).unwrap();
        assert_eq!(used, 26);
        assert!(msg.is_raw());
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn test_text_decodes_to_first_nul() {
        let msg = Message::new(
            MessageId::HwRichResponse,
            EndPoint::Host,
            EndPoint::Usb,
            [Value::U16(0x0443), Value::U16(7), Value::from("limit")],
        )
        .unwrap();
        let bytes = encode(&msg).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 68);
        let (decoded, _) = decode(&bytes).unwrap();
        assert_eq!(decoded.field("notes").and_then(Value::as_str), Some("limit"));
    }

    #[test]
    fn test_raw_body_too_long() {
        let msg = Message::raw_long(0x7000, EndPoint::Usb, EndPoint::Host, vec![0; MAX_BODY_LEN + 1]);
        assert!(matches!(encode(&msg), Err(EncodingError::BodyTooLong { .. })));
    }
}
