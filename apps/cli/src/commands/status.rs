//! 状态查询与监视

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use apt_sdk::models::MotorModel;
use apt_sdk::{AptDevice, DeviceStatus, MotorController};
use clap::Args;
use serde_json::json;

use crate::session::DeviceTask;

/// 首次状态上报的最长等待时间
const FIRST_STATUS_WAIT: Duration = Duration::from_millis(500);

/// 打印所有通道的最新状态
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// 以 JSON 输出
    #[arg(long)]
    pub json: bool,
}

impl DeviceTask for StatusCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        let deadline = Instant::now() + FIRST_STATUS_WAIT;
        while !has_status(&device.connection().statuses()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        let statuses = device.connection().statuses();
        if self.json {
            let slots: Vec<_> = statuses
                .iter()
                .enumerate()
                .flat_map(|(bay, channels)| {
                    channels.iter().enumerate().map(move |(channel, s)| {
                        json!({
                            "bay": bay,
                            "channel": channel,
                            "position": s.position,
                            "velocity": s.velocity,
                            "encoder_count": s.encoder_count,
                            "status_bits": s.status_bits.raw(),
                            "flags": s.flags,
                        })
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&slots)?);
        } else {
            for (bay, channels) in statuses.iter().enumerate() {
                for (channel, status) in channels.iter().enumerate() {
                    println!("[{bay}:{channel}] {}", describe(status));
                }
            }
        }
        Ok(())
    }
}

/// 打印硬件信息
#[derive(Args, Debug)]
pub struct InfoCommand;

impl DeviceTask for InfoCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        let info = device.request_info().context("Hardware info request failed")?;
        println!("Model:     {}", info.model_number);
        println!("Serial:    {}", info.serial_number);
        println!("Firmware:  {}", info.firmware_version());
        println!("HW type:   {}", info.hw_type);
        println!("HW ver:    {}", info.hw_version);
        println!("Channels:  {}", info.nchs);
        if !info.notes.is_empty() {
            println!("Notes:     {}", info.notes);
        }
        Ok(())
    }
}

/// 持续打印状态直到 Ctrl-C 或断线
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 刷新间隔（毫秒）
    #[arg(short, long, default_value_t = 500)]
    pub interval_ms: u64,
}

impl DeviceTask for MonitorCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)).context("Failed to install Ctrl-C handler")?;

        device.register_error_callback(|report| {
            eprintln!("⚠️  {:?} error {} (msg 0x{:04x}): {}", report.source, report.code, report.msgid, report.notes);
        });

        println!("Monitoring {} (Ctrl-C to quit)", device.name());
        let interval = Duration::from_millis(self.interval_ms.max(10));
        while running.load(Ordering::SeqCst) {
            if !device.is_open() {
                anyhow::bail!("Connection lost");
            }
            for (bay, channels) in device.connection().statuses().iter().enumerate() {
                for (channel, status) in channels.iter().enumerate() {
                    println!("[{bay}:{channel}] {}", describe(status));
                }
            }
            std::thread::sleep(interval);
        }

        let metrics = device.metrics();
        println!(
            "rx={} tx={} resync={} errors={}",
            metrics.rx_messages, metrics.tx_messages, metrics.resync_bytes, metrics.device_errors
        );
        Ok(())
    }
}

fn has_status(statuses: &[Vec<DeviceStatus>]) -> bool {
    statuses.iter().flatten().any(|s| s.updated_at.is_some())
}

/// 单行状态描述
pub fn describe(status: &DeviceStatus) -> String {
    if status.updated_at.is_none() {
        return "no status received".to_string();
    }
    let f = &status.flags;
    let states: Vec<&str> = [
        (f.moving_forward || f.moving_reverse, "moving"),
        (f.jogging_forward || f.jogging_reverse, "jogging"),
        (f.homing, "homing"),
        (f.homed, "homed"),
        (f.forward_limit, "fwd-limit"),
        (f.reverse_limit, "rev-limit"),
        (f.motion_error, "error"),
        (!f.channel_enabled, "disabled"),
    ]
    .into_iter()
    .filter_map(|(on, name)| on.then_some(name))
    .collect();

    format!(
        "pos={:>10} vel={:>7} enc={:>10} [{}]",
        status.position,
        status.velocity,
        status.encoder_count,
        states.join(" ")
    )
}
