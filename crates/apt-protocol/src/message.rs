//! APT 消息
//!
//! [`Message`] 是协议层与传输层之间的统一抽象：
//!
//! ```text
//! Device layer (apt-device)
//!     ↓ commands::* 构建 / feedback::* 解析
//! Message (此类型)
//!     ↓ codec::encode / codec::decode
//! Serial layer (apt-serial)
//! ```
//!
//! 已知 ID 的消息以命名字段的形式保存（[`Fields`]，字段顺序与布局表一致）；
//! 未知 ID 的消息以原始参数字节或原始消息体的形式透传（[`RawPayload`]）。

use smallvec::SmallVec;

use crate::endpoint::EndPoint;
use crate::ids::MessageId;
use crate::layout::{FieldKind, Form, MessageLayout, layout};
use crate::EncodingError;

/// 字段值
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    U8(u8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// 整数字段统一转为 i64，文本/字节返回 `None`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::Text(_) | Value::Bytes(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// 值是否能以给定类型写出
    pub fn fits(&self, kind: FieldKind) -> bool {
        match (self, kind) {
            (Value::U8(_), FieldKind::U8)
            | (Value::U16(_), FieldKind::U16)
            | (Value::I16(_), FieldKind::I16)
            | (Value::U32(_), FieldKind::U32)
            | (Value::I32(_), FieldKind::I32) => true,
            (Value::Text(s), FieldKind::Text(n)) => s.len() <= n && !s.contains('\0'),
            (Value::Bytes(b), FieldKind::Bytes(n)) => b.len() == n,
            _ => false,
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// 已知消息的字段值，顺序与布局表一致
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fields(pub SmallVec<[Value; 8]>);

impl Fields {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl FromIterator<Value> for Fields {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 未知消息的原始负载
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RawPayload {
    /// 短帧头部的 `param1`, `param2`
    Params([u8; 2]),
    /// 长帧消息体
    Body(Vec<u8>),
}

/// 消息负载
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageData {
    Fields(Fields),
    Raw(RawPayload),
}

/// 一条 APT 消息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// 原始消息 ID
    pub id: u16,
    pub dest: EndPoint,
    pub source: EndPoint,
    pub data: MessageData,
}

impl Message {
    /// 按布局表构建已知消息，校验字段数量与类型
    pub fn new<I>(id: MessageId, dest: EndPoint, source: EndPoint, values: I) -> Result<Self, EncodingError>
    where
        I: IntoIterator<Item = Value>,
    {
        let message = Self {
            id: id.raw(),
            dest,
            source,
            data: MessageData::Fields(values.into_iter().collect()),
        };
        message.validate()?;
        Ok(message)
    }

    /// 构建未知 ID 的短帧
    pub fn raw_short(id: u16, dest: EndPoint, source: EndPoint, params: [u8; 2]) -> Self {
        Self {
            id,
            dest,
            source,
            data: MessageData::Raw(RawPayload::Params(params)),
        }
    }

    /// 构建未知 ID 的长帧
    pub fn raw_long(id: u16, dest: EndPoint, source: EndPoint, body: Vec<u8>) -> Self {
        Self {
            id,
            dest,
            source,
            data: MessageData::Raw(RawPayload::Body(body)),
        }
    }

    /// 已知消息类型；原始消息返回 `None`
    pub fn kind(&self) -> Option<MessageId> {
        match self.data {
            MessageData::Fields(_) => MessageId::try_from(self.id).ok(),
            MessageData::Raw(_) => None,
        }
    }

    /// 布局表项（仅对已知消息）
    pub fn layout(&self) -> Option<&'static MessageLayout> {
        self.kind().and_then(MessageId::layout)
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.data, MessageData::Raw(_))
    }

    pub fn fields(&self) -> Option<&Fields> {
        match &self.data {
            MessageData::Fields(f) => Some(f),
            MessageData::Raw(_) => None,
        }
    }

    /// 按名称取字段
    pub fn field(&self, name: &str) -> Option<&Value> {
        let index = self.layout()?.index_of(name)?;
        self.fields()?.0.get(index)
    }

    /// 按名称取整数字段
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    /// 通道标识（短帧为 `u8` 参数，长帧为 `u16` 字段）
    pub fn chan_ident(&self) -> Option<u16> {
        self.field_i64("chan_ident").and_then(|v| u16::try_from(v).ok())
    }

    /// 对照布局表检查字段
    pub fn validate(&self) -> Result<(), EncodingError> {
        let fields = match &self.data {
            MessageData::Fields(fields) => fields,
            MessageData::Raw(RawPayload::Body(body)) => {
                if body.len() > crate::MAX_BODY_LEN {
                    return Err(EncodingError::BodyTooLong { len: body.len() });
                }
                return Ok(());
            },
            MessageData::Raw(RawPayload::Params(_)) => return Ok(()),
        };
        let entry = layout(self.id).ok_or(EncodingError::UnknownId { id: self.id })?;
        if fields.len() != entry.fields.len() {
            return Err(EncodingError::FieldCount {
                name: entry.name,
                expected: entry.fields.len(),
                actual: fields.len(),
            });
        }
        for (spec, value) in entry.fields.iter().zip(fields.iter()) {
            if !value.fits(spec.kind) {
                return Err(EncodingError::FieldMismatch {
                    name: entry.name,
                    field: spec.name,
                    kind: spec.kind,
                });
            }
        }
        debug_assert!(entry.form == Form::Long || entry.fields.len() <= 2);
        Ok(())
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.layout() {
            Some(entry) => write!(f, "{} {} -> {}", entry.name, self.source, self.dest),
            None => write!(f, "0x{:04X} {} -> {}", self.id, self.source, self.dest),
        }
    }
}
