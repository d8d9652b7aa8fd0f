//! # APT 设备接口
//!
//! 按型号划分的 Thorlabs APT 控制器接口。
//!
//! 设备由共享的 [`DeviceCore`]（连接、寻址、选项）和一组能力 trait 组成：
//!
//! - [`AptDevice`]：识别、硬件信息、回调、关闭
//! - [`Motor`]：回零、绝对/相对移动、停止、速度/点动/回零参数
//! - [`EncoderMotor`]：编码器计数器
//! - [`Triggered`]：触发模式
//! - [`MultiBay`] / [`SingleChannel`]：状态视图
//!
//! 型号（[`models`]）决定哪些 trait 可用，不支持的操作在编译期即被拒绝。
//!
//! # 快速开始
//!
//! ```no_run
//! use apt_device::prelude::*;
//! use apt_device::models::Bbd203;
//!
//! let stage = MotorController::<Bbd203>::open(DeviceOptions::for_model::<Bbd203>())?;
//! stage.register_error_callback(|report| eprintln!("{report}"));
//! stage.home(0, 0)?;
//! stage.move_absolute(20_000, 0, 0)?;
//! println!("{:?}", stage.bay_status(0, 0)?.flags);
//! # Ok::<(), apt_device::DeviceError>(())
//! ```

mod capabilities;
mod device;
mod error;
pub mod models;
mod options;

pub use capabilities::{AptDevice, EncoderMotor, Motor, MultiBay, PreparedMove, SingleChannel, Triggered};
pub use device::{DeviceCore, MotorController};
pub use error::{DeviceError, Result};
pub use options::{DeviceOptions, MotionConfig};

/// 常用类型
pub mod prelude {
    pub use crate::capabilities::{AptDevice, EncoderMotor, Motor, MultiBay, PreparedMove, SingleChannel, Triggered};
    pub use crate::device::MotorController;
    pub use crate::error::DeviceError;
    pub use crate::options::{DeviceOptions, MotionConfig};
    pub use apt_driver::DeviceStatus;
    pub use apt_protocol::{Direction, HomeParams, JogMode, JogParams, StopMode};
}
