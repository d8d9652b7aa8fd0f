//! 设备选项

use std::time::Duration;

use apt_driver::PipelineConfig;
use apt_serial::SerialConfig;

use crate::models::Model;

/// 阻塞运动指令的等待策略
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotionConfig {
    /// 为 `false` 时运动指令发出即返回
    pub wait: bool,
    /// `move_absolute` / `move_relative` 等待运动结束的上限
    pub move_timeout: Duration,
    /// `home` 等待回零完成的上限
    pub home_timeout: Duration,
    /// 请求/应答类操作（硬件信息、参数回读）的超时
    pub reply_timeout: Duration,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            wait: true,
            move_timeout: Duration::from_secs(30),
            home_timeout: Duration::from_secs(60),
            reply_timeout: Duration::from_secs(2),
        }
    }
}

/// 打开设备时的选项
///
/// 默认值随型号不同，使用 [`DeviceOptions::for_model`] 取得。
///
/// # Example
///
/// ```
/// use apt_device::{DeviceOptions, models::Kdc101};
///
/// let options = DeviceOptions::for_model::<Kdc101>();
/// assert!(options.invert_direction_logic);
/// assert!(options.swap_limit_switches);
/// assert!(!options.home_on_open);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceOptions {
    /// 反转方向指令的线上取值
    pub invert_direction_logic: bool,
    /// 交换状态位中的正反向限位
    pub swap_limit_switches: bool,
    /// 打开后立即对所有 bay 回零
    pub home_on_open: bool,
    pub motion: MotionConfig,
    pub pipeline: PipelineConfig,
    pub serial: SerialConfig,
}

impl DeviceOptions {
    pub fn for_model<M: Model>() -> Self {
        Self {
            invert_direction_logic: M::INVERT_DIRECTION,
            swap_limit_switches: M::SWAP_LIMITS,
            home_on_open: false,
            motion: MotionConfig::default(),
            pipeline: PipelineConfig::default(),
            serial: SerialConfig::default(),
        }
    }

    pub fn with_motion(mut self, motion: MotionConfig) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn home_on_open(mut self, home: bool) -> Self {
        self.home_on_open = home;
        self
    }
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self::for_model::<crate::models::GenericController>()
    }
}
