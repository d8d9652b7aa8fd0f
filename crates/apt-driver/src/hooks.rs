//! 回调注册表
//!
//! 读线程把每条解码后的消息（以及设备错误、断线事件）作为 [`Event`] 发布到通道，
//! 分发线程按注册顺序调用匹配的 [`Listener`]。回调不在读线程中执行，
//! 阻塞的回调只会拖慢分发线程，不会影响收包和状态更新。
//!
//! # 使用示例
//!
//! ```rust
//! use apt_driver::hooks::{CallbackRegistry, Event, Filter};
//! use apt_protocol::{EndPoint, MessageId, commands};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let mut registry = CallbackRegistry::new();
//! let homed = Arc::new(AtomicUsize::new(0));
//! let counter = homed.clone();
//! registry.subscribe(
//!     Filter::Kind(MessageId::MotMoveHome),
//!     Arc::new(move |_: &Event| {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!     }),
//! );
//!
//! let event = Event::Message(commands::mot_move_home(EndPoint::Usb, 1));
//! let panics = apt_driver::hooks::invoke_all(&registry.matching(&event), &event);
//! assert_eq!(panics, 0);
//! assert_eq!(homed.load(Ordering::Relaxed), 1);
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use apt_protocol::{ErrorReport, Message, MessageId};
use smallvec::SmallVec;
use tracing::error;

/// 分发给回调的事件
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// 一条解码后的消息（包括 raw 消息）
    Message(Message),
    /// 设备上报的错误
    Error(ErrorReport),
    /// 读线程检测到连接丢失
    Disconnected,
}

/// 订阅条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// 任意消息
    Any,
    /// 指定类型的消息
    Kind(MessageId),
    /// 按原始 ID 匹配，可用于布局表之外的消息
    Id(u16),
    /// 设备错误报告
    Error,
    /// 连接丢失
    Disconnect,
}

impl Filter {
    pub fn matches(&self, event: &Event) -> bool {
        match (self, event) {
            (Filter::Any, Event::Message(_)) => true,
            (Filter::Kind(kind), Event::Message(message)) => message.kind() == Some(*kind),
            (Filter::Id(id), Event::Message(message)) => message.id == *id,
            (Filter::Error, Event::Error(_)) => true,
            (Filter::Disconnect, Event::Disconnected) => true,
            _ => false,
        }
    }
}

/// 回调接口
///
/// 在分发线程中调用。实现不应无限期阻塞，否则后续事件会积压。
/// 闭包 `Fn(&Event)` 自动实现此 trait。
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// 订阅句柄，用于 [`CallbackRegistry::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    filter: Filter,
    listener: Arc<dyn Listener>,
}

/// 回调注册表
///
/// 本身不是线程安全的，由连接上下文通过 `RwLock<CallbackRegistry>` 保护。
/// 分发时先在读锁内复制出匹配的回调，释放锁之后再调用，
/// 因此回调内部可以再订阅或取消订阅。
#[derive(Default)]
pub struct CallbackRegistry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl CallbackRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    /// 注册回调，返回订阅句柄
    pub fn subscribe(&mut self, filter: Filter, listener: Arc<dyn Listener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, filter, listener });
        id
    }

    /// 取消订阅；句柄不存在时返回 `false`
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// 按注册顺序返回匹配事件的回调
    pub fn matching(&self, event: &Event) -> SmallVec<[Arc<dyn Listener>; 4]> {
        self.entries
            .iter()
            .filter(|entry| entry.filter.matches(event))
            .map(|entry| entry.listener.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 依次调用回调，返回 panic 的回调数量
///
/// 一个回调 panic 不影响后续回调。
pub fn invoke_all(listeners: &[Arc<dyn Listener>], event: &Event) -> usize {
    let mut panics = 0;
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.on_event(event))).is_err() {
            error!("Listener panicked while handling {:?}", event);
            panics += 1;
        }
    }
    panics
}
