//! 驱动层模块
//!
//! 本模块提供 APT 控制器的连接管理，包括：
//! - 后台线程（读线程、分发线程、保活线程）
//! - 状态存储（按 bay/通道合并更新，条件变量等待）
//! - 回调注册表（按消息类型、设备错误、断线事件订阅）
//! - 传输指标与连接监视
//!
//! # 使用场景
//!
//! 适用于需要直接收发 APT 消息的场景。
//! 大多数用户应该使用 `apt-device` 提供的按型号划分的设备接口。

mod builder;
mod connection;
mod error;
pub mod heartbeat;
pub mod hooks;
pub mod metrics;
pub mod mode;
pub mod pipeline;
pub mod state;

pub use builder::ConnectionBuilder;
pub use connection::AptConnection;
pub use error::DriverError;
pub use heartbeat::ConnectionMonitor;
pub use hooks::{CallbackRegistry, Event, Filter, Listener, SubscriptionId};
pub use metrics::{MetricsSnapshot, TransportMetrics};
pub use mode::{AtomicConnectionState, ConnectionState};
pub use pipeline::{PipelineConfig, dispatch_loop, keepalive_loop, rx_loop};
pub use state::{Addressing, DeviceStatus, DriverContext, StatusStore};
