//! 运动命令：识别、回零、移动、停止

use anyhow::{Context, Result};
use apt_sdk::models::MotorModel;
use apt_sdk::{AptDevice, Motor, MotorController};
use clap::{ArgGroup, Args};

use crate::session::DeviceTask;

/// 目标通道
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct Target {
    /// bay 序号（从 0 开始）
    #[arg(short, long, default_value_t = 0)]
    pub bay: usize,

    /// 通道序号（从 0 开始）
    #[arg(short, long, default_value_t = 0)]
    pub channel: usize,
}

/// 让指示灯闪烁
#[derive(Args, Debug)]
pub struct IdentifyCommand {
    /// 只闪烁某个通道（机架式控制器）
    #[arg(long)]
    pub only_channel: Option<usize>,
}

impl DeviceTask for IdentifyCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        match self.only_channel {
            Some(channel) => device.identify_channel(channel)?,
            None => device.identify()?,
        }
        println!("💡 {} identified", device.name());
        Ok(())
    }
}

/// 回零
#[derive(Args, Debug)]
pub struct HomeCommand {
    #[command(flatten)]
    pub target: Target,

    /// 对所有通道同时回零
    #[arg(long)]
    pub all: bool,
}

impl DeviceTask for HomeCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        println!("⏳ Homing...");
        if self.all {
            device.core().home_all().context("Homing failed")?;
        } else {
            device.home(self.target.bay, self.target.channel).context("Homing failed")?;
        }
        println!("✅ Homed");
        Ok(())
    }
}

/// 移动
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("destination").required(true).args(["absolute", "relative"])))]
pub struct MoveCommand {
    /// 绝对目标位置（编码器计数）
    #[arg(long, allow_negative_numbers = true)]
    pub absolute: Option<i32>,

    /// 相对距离（编码器计数）
    #[arg(long, allow_negative_numbers = true)]
    pub relative: Option<i32>,

    #[command(flatten)]
    pub target: Target,
}

impl DeviceTask for MoveCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        let Target { bay, channel } = self.target;
        let result = match (self.absolute, self.relative) {
            (Some(position), _) => device.move_absolute(position, bay, channel),
            (None, Some(distance)) => device.move_relative(distance, bay, channel),
            (None, None) => anyhow::bail!("Either --absolute or --relative is required"),
        };
        result.context("Move failed")?;

        let position = device.connection().status(bay, channel).map(|s| s.position).unwrap_or_default();
        println!("✅ Position: {}", position);
        Ok(())
    }
}

/// 停止
#[derive(Args, Debug)]
pub struct StopCommand {
    #[command(flatten)]
    pub target: Target,

    /// 立即停止（否则按加速度曲线减速）
    #[arg(long)]
    pub immediate: bool,
}

impl DeviceTask for StopCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        device.stop(self.immediate, self.target.bay, self.target.channel)?;
        println!("🛑 Stop sent");
        Ok(())
    }
}
