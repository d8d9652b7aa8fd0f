//! 连接状态定义
//!
//! 状态由读线程和调用方线程共同修改，使用原子操作保证切换的线程安全性。

use std::sync::atomic::{AtomicU8, Ordering};

/// 连接状态
///
/// - **Open**: 正常收发
/// - **Closed**: 调用方主动关闭，后续发送返回 `NotConnected`
/// - **Lost**: 读线程遇到 I/O 故障，后续发送返回 `ConnectionLost`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Open = 0,
    Closed = 1,
    Lost = 2,
}

impl ConnectionState {
    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Lost。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closed,
            _ => Self::Lost,
        }
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// 连接状态（原子版本，用于线程间共享）
///
/// # 示例
///
/// ```rust
/// use apt_driver::mode::{AtomicConnectionState, ConnectionState};
/// use std::sync::atomic::Ordering;
///
/// let state = AtomicConnectionState::new(ConnectionState::Open);
/// assert!(state.transition(ConnectionState::Open, ConnectionState::Lost));
/// assert_eq!(state.get(Ordering::Acquire), ConnectionState::Lost);
/// ```
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: ConnectionState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 仅当当前状态为 `from` 时切换到 `to`
    ///
    /// 返回是否切换成功。读线程与 `close()` 竞争时只有一方生效。
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.inner
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Open)
    }
}
