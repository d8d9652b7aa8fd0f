//! 一次命令执行的连接会话
//!
//! 每个命令独立执行：
//! 1. 合并配置文件与命令行参数
//! 2. 按型号打开控制器
//! 3. 执行操作
//! 4. 断开连接（`MotorController` 析构时）

use std::time::Duration;

use anyhow::{Context, Result};
use apt_sdk::models::{Bbd201, Bbd202, Bbd203, Bsc201, Bsc202, Bsc203, Kdc101, Model, MotorModel, Tdc001};
use apt_sdk::serial::DeviceFilter;
use apt_sdk::{DeviceOptions, MotionConfig, MotorController};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::CliConfig;

/// 支持的控制器型号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Bbd201,
    Bbd202,
    Bbd203,
    Bsc201,
    Bsc202,
    Bsc203,
    Tdc001,
    #[default]
    Kdc101,
}

/// 所有设备命令共享的连接参数，写在子命令之前
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// 串口路径（覆盖配置）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 自动查找时匹配的序列号前缀（覆盖配置）
    #[arg(short, long)]
    pub serial_prefix: Option<String>,

    /// 控制器型号（覆盖配置）
    #[arg(short, long, value_enum)]
    pub model: Option<ModelKind>,

    /// 运动指令发出后立即返回
    #[arg(long)]
    pub no_wait: bool,
}

/// 需要打开设备的命令
pub trait DeviceTask {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()>;
}

/// 合并后的会话参数
#[derive(Debug, Clone)]
pub struct Session {
    pub port: Option<String>,
    pub serial_prefix: Option<String>,
    pub model: ModelKind,
    pub motion: MotionConfig,
}

impl Session {
    /// 命令行参数优先于配置文件
    pub fn new(args: &ConnectArgs, config: &CliConfig) -> Self {
        let mut motion = config.motion();
        if args.no_wait {
            motion.wait = false;
        }
        Self {
            port: args.port.clone().or_else(|| config.port.clone()),
            serial_prefix: args.serial_prefix.clone().or_else(|| config.serial_prefix.clone()),
            model: args.model.or(config.model).unwrap_or_default(),
            motion,
        }
    }

    pub fn run<T: DeviceTask>(&self, task: T) -> Result<()> {
        match self.model {
            ModelKind::Bbd201 => task.run(self.open::<Bbd201>()?),
            ModelKind::Bbd202 => task.run(self.open::<Bbd202>()?),
            ModelKind::Bbd203 => task.run(self.open::<Bbd203>()?),
            ModelKind::Bsc201 => task.run(self.open::<Bsc201>()?),
            ModelKind::Bsc202 => task.run(self.open::<Bsc202>()?),
            ModelKind::Bsc203 => task.run(self.open::<Bsc203>()?),
            ModelKind::Tdc001 => task.run(self.open::<Tdc001>()?),
            ModelKind::Kdc101 => task.run(self.open::<Kdc101>()?),
        }
    }

    fn open<M: Model>(&self) -> Result<MotorController<M>> {
        let options = DeviceOptions::for_model::<M>().with_motion(self.motion.clone());
        let device = match (&self.port, &self.serial_prefix) {
            (Some(port), _) => MotorController::<M>::open_port(port, options),
            (None, Some(prefix)) => {
                MotorController::<M>::open_matching(DeviceFilter::with_serial_prefix(prefix.clone()), options)
            },
            (None, None) => MotorController::<M>::open(options),
        };
        device.with_context(|| format!("Failed to open {}", M::NAME))
    }
}

/// 秒数转 `Duration`，拒绝负数与非有限值
pub fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}
