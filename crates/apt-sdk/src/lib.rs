//! APT SDK - Thorlabs APT 运动控制器 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): APT 消息布局表与编解码
//! - **串口层** (`serial`): 串口抽象、设备查找、模拟串口
//! - **驱动层** (`driver`): 后台读线程、状态存储、回调分发
//! - **设备层** (`device`): 按型号划分的能力 trait
//!
//! # 快速开始
//!
//! ```no_run
//! use apt_sdk::prelude::*;
//! use apt_sdk::models::Kdc101;
//!
//! apt_sdk::init_logging();
//! let stage = MotorController::<Kdc101>::open(DeviceOptions::for_model::<Kdc101>())?;
//! stage.home(0, 0)?;
//! stage.move_relative(2000, 0, 0)?;
//! println!("position: {}", stage.status().position);
//! # Ok::<(), apt_sdk::DeviceError>(())
//! ```
//!
//! 需要直接收发消息的用户可以使用驱动层：
//!
//! ```rust
//! use apt_sdk::driver::{AptConnection, ConnectionBuilder};
//! ```

pub use apt_device as device;
pub use apt_driver as driver;
pub use apt_protocol as protocol;
pub use apt_serial as serial;

pub use apt_device::{
    AptDevice, DeviceError, DeviceOptions, EncoderMotor, MotionConfig, Motor, MotorController, MultiBay,
    SingleChannel, Triggered, models,
};
pub use apt_driver::{DeviceStatus, DriverError};
pub use apt_protocol::{EncodingError, Message, MessageId, ProtocolError};
pub use apt_serial::SerialError;

/// 常用类型
pub mod prelude {
    pub use apt_device::prelude::*;
    pub use apt_driver::{AptConnection, ConnectionBuilder};
    pub use apt_protocol::{EndPoint, Message, MessageId};
}

/// 初始化日志
///
/// 使用 `RUST_LOG` 环境变量过滤，未设置时为 `info`；
/// 同时把 `log` crate 的记录转发到 tracing。重复调用无副作用。
pub fn init_logging() {
    init_logging_with("info");
}

/// 以给定的默认过滤指令初始化日志
pub fn init_logging_with(default_directive: &str) {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_log::LogTracer::init();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
