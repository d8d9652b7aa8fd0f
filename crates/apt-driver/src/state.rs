//! 状态存储
//!
//! 按 (bay 序号, 通道序号) 保存控制器最近一次上报的状态。只有读线程调用
//! [`StatusStore::update`]；调用方线程通过 [`StatusStore::get`] 读取快照，
//! 或通过 [`StatusStore::wait_for`] 阻塞等待某个条件成立。
//!
//! 更新按字段合并：消息里没有的字段保持原值，不会被重置为默认值。

use std::time::{Duration, Instant};

use apt_protocol::{
    EndPoint, HomeParams, JogParams, Message, MessageId, ParamsUpdate, StatusBits, StatusFlags, StatusUpdate,
    VelocityParams,
};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::trace;

use crate::error::DriverError;
use crate::heartbeat::ConnectionMonitor;
use crate::hooks::CallbackRegistry;
use crate::metrics::TransportMetrics;
use crate::mode::{AtomicConnectionState, ConnectionState};

/// 单个通道的状态快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceStatus {
    /// 位置（编码器计数）
    pub position: i32,
    /// 速度（设备内部单位）
    pub velocity: i32,
    /// 编码器计数（仅部分状态消息携带）
    pub encoder_count: i32,
    pub status_bits: StatusBits,
    /// `status_bits` 的解码形式
    pub flags: StatusFlags,
    /// 最近一次更新的时间；`None` 表示从未收到过状态
    pub updated_at: Option<Instant>,
    /// 最近一次更新时存储的全局序号
    pub seq: u64,
    /// 收到 `MOT_MOVE_COMPLETED` 的次数
    pub moves_completed: u64,
    /// 收到 `MOT_MOVE_STOPPED` 的次数
    pub moves_stopped: u64,
    /// 收到 `MOT_MOVE_HOMED` 的次数
    pub homed_events: u64,
    /// 状态位“回零中”由 0 变 1 的次数
    pub homing_starts: u64,

    // 最近一次回读的参数块
    pub velocity_params: Option<VelocityParams>,
    pub jog_params: Option<JogParams>,
    pub backlash_distance: Option<i32>,
    pub home_params: Option<HomeParams>,
    pub relative_distance: Option<i32>,
    pub absolute_position: Option<i32>,
    pub trigger_mode: Option<u8>,
    pub enabled: Option<bool>,
}

impl DeviceStatus {
    /// 运动结束事件总数（完成或停止）
    pub fn move_events(&self) -> u64 {
        self.moves_completed + self.moves_stopped
    }

    /// 是否已完成回零且不在回零过程中
    pub fn is_homed(&self) -> bool {
        self.flags.homed && !self.flags.homing
    }
}

/// 消息到状态槽位的路由表
///
/// bay 序号是消息源端点在 `bays` 中的位置，通道序号是消息 `chan_ident`
/// 在 `channels` 中的位置。
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Addressing {
    pub bays: Vec<EndPoint>,
    pub channels: Vec<u16>,
    /// 交换正/反向限位标志（部分控制器的接线与位定义相反）
    pub swap_limit_switches: bool,
}

impl Addressing {
    /// 单通道 USB 控制器（TDC001、KDC101 等）
    pub fn usb() -> Self {
        Self {
            bays: vec![EndPoint::Usb],
            channels: vec![1],
            swap_limit_switches: false,
        }
    }

    /// 机架控制器的前 `count` 个插槽，每个插槽一个通道
    pub fn rack(count: usize) -> Self {
        Self {
            bays: (0..count).filter_map(EndPoint::bay).collect(),
            channels: vec![1],
            swap_limit_switches: false,
        }
    }

    pub fn with_swapped_limits(mut self, swap: bool) -> Self {
        self.swap_limit_switches = swap;
        self
    }

    pub fn locate(&self, source: EndPoint, chan_ident: u16) -> Option<(usize, usize)> {
        let bay = self.bays.iter().position(|b| *b == source)?;
        let channel = self.channels.iter().position(|c| *c == chan_ident)?;
        Some((bay, channel))
    }

    pub fn bay_endpoint(&self, bay: usize) -> Option<EndPoint> {
        self.bays.get(bay).copied()
    }

    pub fn chan_ident(&self, channel: usize) -> Option<u16> {
        self.channels.get(channel).copied()
    }
}

impl Default for Addressing {
    fn default() -> Self {
        Self::usb()
    }
}

struct StoreInner {
    statuses: Vec<Vec<DeviceStatus>>,
    seq: u64,
    closed: Option<ConnectionState>,
}

/// 加锁的状态存储
pub struct StatusStore {
    addressing: Addressing,
    inner: Mutex<StoreInner>,
    changed: Condvar,
}

impl StatusStore {
    pub fn new(addressing: Addressing) -> Self {
        let statuses = vec![vec![DeviceStatus::default(); addressing.channels.len()]; addressing.bays.len()];
        Self {
            addressing,
            inner: Mutex::new(StoreInner {
                statuses,
                seq: 0,
                closed: None,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    /// 读取单个通道的快照
    pub fn get(&self, bay: usize, channel: usize) -> Option<DeviceStatus> {
        self.inner.lock().statuses.get(bay)?.get(channel).cloned()
    }

    /// 按 (bay, 通道) 排列的全部快照
    pub fn all(&self) -> Vec<Vec<DeviceStatus>> {
        self.inner.lock().statuses.clone()
    }

    /// 全局更新序号
    pub fn seq(&self) -> u64 {
        self.inner.lock().seq
    }

    /// 用一条消息更新状态（仅由读线程调用）
    ///
    /// 返回被更新的槽位；无法路由或不携带状态的消息返回 `None`。
    pub fn update(&self, message: &Message) -> Option<(usize, usize)> {
        let kind = message.kind()?;
        let status = StatusUpdate::from_message(message);
        let params = ParamsUpdate::from_message(message);
        if status.is_none() && params.is_none() && kind != MessageId::MotMoveHomed {
            return None;
        }
        let (bay, channel) = self.addressing.locate(message.source, message.chan_ident()?)?;

        let mut inner = self.inner.lock();
        inner.seq += 1;
        let seq = inner.seq;
        let entry = inner.statuses.get_mut(bay)?.get_mut(channel)?;

        if let Some(update) = status {
            if let Some(position) = update.position {
                entry.position = position;
            }
            if let Some(velocity) = update.velocity {
                entry.velocity = velocity;
            }
            if let Some(count) = update.encoder_count {
                entry.encoder_count = count;
            }
            if let Some(bits) = update.status_bits {
                let bits = if self.addressing.swap_limit_switches {
                    bits.with_limits_swapped()
                } else {
                    bits
                };
                if bits.homing() && !entry.flags.homing {
                    entry.homing_starts += 1;
                }
                entry.status_bits = bits;
                entry.flags = StatusFlags::from(bits);
            }
        }

        match kind {
            MessageId::MotMoveCompleted => entry.moves_completed += 1,
            MessageId::MotMoveStopped => entry.moves_stopped += 1,
            MessageId::MotMoveHomed => entry.homed_events += 1,
            _ => {},
        }

        if let Some((_, params)) = params {
            match params {
                ParamsUpdate::Velocity(p) => entry.velocity_params = Some(p),
                ParamsUpdate::Jog(p) => entry.jog_params = Some(p),
                ParamsUpdate::GenMove { backlash_distance } => entry.backlash_distance = Some(backlash_distance),
                ParamsUpdate::Home(p) => entry.home_params = Some(p),
                ParamsUpdate::MoveRelative { relative_distance } => {
                    entry.relative_distance = Some(relative_distance)
                },
                ParamsUpdate::MoveAbsolute { absolute_position } => {
                    entry.absolute_position = Some(absolute_position)
                },
                ParamsUpdate::Trigger { mode } => entry.trigger_mode = Some(mode),
                ParamsUpdate::ChannelEnabled(enabled) => entry.enabled = Some(enabled),
            }
        }

        entry.updated_at = Some(Instant::now());
        entry.seq = seq;
        trace!("status[{}][{}] updated by {:?} (seq {})", bay, channel, kind, seq);
        drop(inner);
        self.changed.notify_all();
        Some((bay, channel))
    }

    /// 阻塞直到 `predicate` 对该通道成立、超时或连接关闭
    ///
    /// 条件先于关闭检查：如果条件在断线前已经成立，仍然返回成功。
    pub fn wait_for<F>(&self, bay: usize, channel: usize, mut predicate: F, timeout: Duration) -> Result<DeviceStatus, DriverError>
    where
        F: FnMut(&DeviceStatus) -> bool,
    {
        // 超出 `Instant` 表示范围的超时视为不限时
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        loop {
            let status = inner
                .statuses
                .get(bay)
                .and_then(|b| b.get(channel))
                .ok_or_else(|| DriverError::InvalidInput(format!("no status slot for bay {bay}, channel {channel}")))?;
            if predicate(status) {
                return Ok(status.clone());
            }
            match inner.closed {
                Some(ConnectionState::Lost) => return Err(DriverError::ConnectionLost),
                Some(_) => return Err(DriverError::NotConnected),
                None => {},
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DriverError::Timeout);
                    }
                    self.changed.wait_for(&mut inner, deadline - now);
                },
                None => self.changed.wait(&mut inner),
            }
        }
    }

    /// 标记连接已关闭并唤醒所有等待者
    ///
    /// 先到的原因生效：丢失之后的用户关闭不会覆盖 `Lost`。
    pub fn close(&self, reason: ConnectionState) {
        let mut inner = self.inner.lock();
        if inner.closed.is_none() && reason != ConnectionState::Open {
            inner.closed = Some(reason);
        }
        drop(inner);
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed.is_some()
    }
}

/// 连接的共享上下文
///
/// 由读线程、分发线程、保活线程和连接句柄共同持有。
pub struct DriverContext {
    pub store: StatusStore,
    pub registry: RwLock<CallbackRegistry>,
    pub state: AtomicConnectionState,
    pub metrics: TransportMetrics,
    pub monitor: ConnectionMonitor,
}

impl DriverContext {
    pub fn new(addressing: Addressing, monitor_timeout: Duration) -> Self {
        Self {
            store: StatusStore::new(addressing),
            registry: RwLock::new(CallbackRegistry::new()),
            state: AtomicConnectionState::new(ConnectionState::Open),
            metrics: TransportMetrics::new(),
            monitor: ConnectionMonitor::new(monitor_timeout),
        }
    }
}
