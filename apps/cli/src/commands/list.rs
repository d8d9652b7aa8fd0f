//! 列出可用的控制器串口

use anyhow::{Context, Result};
use apt_sdk::serial::{DeviceFilter, SystemPorts, list_candidates};
use clap::Args;

/// 列出命令参数
#[derive(Args, Debug)]
pub struct ListCommand {
    /// USB 厂商 ID（十六进制，如 0403）
    #[arg(long, value_parser = parse_hex_u16)]
    pub vid: Option<u16>,

    /// 序列号前缀（覆盖配置）
    #[arg(short, long)]
    pub serial_prefix: Option<String>,

    /// 不按 Thorlabs 描述符过滤
    #[arg(long)]
    pub all: bool,
}

impl ListCommand {
    /// `fallback_prefix` 为配置或顶层参数中的前缀
    pub fn filter(&self, fallback_prefix: Option<&str>) -> DeviceFilter {
        let base = if self.all {
            DeviceFilter {
                manufacturer: None,
                product: None,
                ..DeviceFilter::default()
            }
        } else {
            DeviceFilter::default()
        };
        DeviceFilter {
            vid: self.vid,
            serial_number: self.serial_prefix.as_deref().or(fallback_prefix).map(str::to_string),
            ..base
        }
    }

    pub fn execute(&self, fallback_prefix: Option<&str>) -> Result<()> {
        let filter = self.filter(fallback_prefix);
        let found = list_candidates(&SystemPorts, &filter).context("Failed to enumerate serial ports")?;
        if found.is_empty() {
            println!("No matching devices");
            return Ok(());
        }
        for port in found {
            println!(
                "{:<16} {:04x}:{:04x}  serial={:<10} {} {}",
                port.port_name,
                port.vid,
                port.pid,
                port.serial_number.as_deref().unwrap_or("-"),
                port.manufacturer.as_deref().unwrap_or(""),
                port.product.as_deref().unwrap_or(""),
            );
        }
        Ok(())
    }
}

/// 解析十六进制 u16（允许 `0x` 前缀）
pub fn parse_hex_u16(text: &str) -> Result<u16, String> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex value {text:?}: {e}"))
}
