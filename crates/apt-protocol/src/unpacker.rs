//! 流式解包器
//!
//! 串口读取的数据块与帧边界无关。`Unpacker` 缓存未完成的数据，
//! 每次 `feed` 之后通过迭代取出所有完整的消息。

use bytes::{Buf, BytesMut};

use crate::codec::{DEFAULT_MAX_DECODE_BODY, decode_with_limit};
use crate::message::Message;
use crate::DecodeError;

/// 流式解包器
#[derive(Debug)]
pub struct Unpacker {
    buf: BytesMut,
    max_body: usize,
    skipped: u64,
}

impl Default for Unpacker {
    fn default() -> Self {
        Self::new()
    }
}

impl Unpacker {
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_DECODE_BODY)
    }

    /// 指定可接受的最大消息体长度
    pub fn with_max_body(max_body: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            max_body,
            skipped: 0,
        }
    }

    /// 追加接收到的字节
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 取出下一条完整消息；数据不足时返回 `None`
    ///
    /// 头部不合法时丢弃一个字节并继续尝试，直到找到合法头部或数据耗尽。
    pub fn next_message(&mut self) -> Option<Message> {
        loop {
            match decode_with_limit(&self.buf, self.max_body) {
                Ok((message, used)) => {
                    self.buf.advance(used);
                    return Some(message);
                },
                Err(DecodeError::Incomplete { .. }) => return None,
                Err(DecodeError::InvalidHeader(_)) => {
                    self.buf.advance(1);
                    self.skipped += 1;
                },
            }
        }
    }

    /// 累计因失步丢弃的字节数
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped
    }

    /// 缓存中尚未解析的字节数
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// 清空缓存（例如重新打开连接时）
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Iterator for Unpacker {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        self.next_message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::commands;
    use crate::endpoint::EndPoint;

    #[test]
    fn test_split_feed() {
        let bytes = encode(&commands::mot_move_absolute(EndPoint::Bay0, 1, 5000)).unwrap();
        let mut unpacker = Unpacker::new();
        unpacker.feed(&bytes[..3]);
        assert!(unpacker.next_message().is_none());
        unpacker.feed(&bytes[3..8]);
        assert!(unpacker.next_message().is_none());
        unpacker.feed(&bytes[8..]);
        let msg = unpacker.next_message().unwrap();
        assert_eq!(msg.field_i64("position"), Some(5000));
        assert_eq!(unpacker.buffered(), 0);
    }

    #[test]
    fn test_skips_garbage_prefix() {
        let mut stream = vec![0xFF, 0xFE, 0x00];
        stream.extend(encode(&commands::mod_identify(EndPoint::Usb, 1)).unwrap());
        let mut unpacker = Unpacker::new();
        unpacker.feed(&stream);
        let messages: Vec<_> = unpacker.by_ref().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(unpacker.skipped_bytes(), 3);
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut stream = Vec::new();
        for chan in 1..=3 {
            stream.extend(encode(&commands::mot_move_home(EndPoint::Rack, chan)).unwrap());
        }
        let mut unpacker = Unpacker::new();
        unpacker.feed(&stream);
        let chans: Vec<_> = unpacker.map(|m| m.chan_ident()).collect();
        assert_eq!(chans, vec![Some(1), Some(2), Some(3)]);
    }
}
