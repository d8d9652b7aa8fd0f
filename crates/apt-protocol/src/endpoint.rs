//! APT 端点地址
//!
//! 每帧头部的第 4、5 字节分别是目标地址和源地址。目标字节的最高位
//! （`0x80`）不属于地址，而是长帧标志，见 [`LONG_FORM_FLAG`]。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 目标字节中的长帧标志位
pub const LONG_FORM_FLAG: u8 = 0x80;

/// 协议端点
///
/// 主机固定为 `Host`；机架式控制器（BBD/BSC）自身是 `Rack`，
/// 各个插槽是 `Bay0..Bay9`；单通道 USB 控制器（TDC/KDC）统一使用 `Usb`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EndPoint {
    Host = 0x01,
    Rack = 0x11,
    Bay0 = 0x21,
    Bay1 = 0x22,
    Bay2 = 0x23,
    Bay3 = 0x24,
    Bay4 = 0x25,
    Bay5 = 0x26,
    Bay6 = 0x27,
    Bay7 = 0x28,
    Bay8 = 0x29,
    Bay9 = 0x2A,
    Usb = 0x50,
}

impl EndPoint {
    /// 全部端点，按地址排序
    pub const ALL: [EndPoint; 13] = [
        EndPoint::Host,
        EndPoint::Rack,
        EndPoint::Bay0,
        EndPoint::Bay1,
        EndPoint::Bay2,
        EndPoint::Bay3,
        EndPoint::Bay4,
        EndPoint::Bay5,
        EndPoint::Bay6,
        EndPoint::Bay7,
        EndPoint::Bay8,
        EndPoint::Bay9,
        EndPoint::Usb,
    ];

    /// 按插槽序号取得 `BayN`
    pub fn bay(index: usize) -> Option<EndPoint> {
        if index > 9 {
            return None;
        }
        EndPoint::try_from(0x21 + index as u8).ok()
    }

    /// 地址字节
    pub fn address(self) -> u8 {
        self.into()
    }

    /// 从目标字节解析端点（忽略长帧标志位）
    pub fn from_dest_byte(byte: u8) -> Option<EndPoint> {
        EndPoint::try_from(byte & !LONG_FORM_FLAG).ok()
    }
}

impl std::fmt::Display for EndPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.address())
    }
}
