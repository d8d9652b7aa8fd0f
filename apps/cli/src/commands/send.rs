//! 发送原始帧

use anyhow::{Context, Result, anyhow};
use apt_sdk::models::MotorModel;
use apt_sdk::protocol::{Message, MessageId, decode, encode};
use apt_sdk::{AptDevice, MotorController};
use clap::Args;

use super::list::parse_hex_u16;
use crate::session::DeviceTask;

/// 发送一条十六进制编码的完整帧
#[derive(Args, Debug)]
pub struct SendCommand {
    /// 帧内容，如 `230201005001`（目的端点须为控制器地址）
    pub frame: String,

    /// 等待此 ID 的应答（十六进制，如 0006）
    #[arg(long, value_parser = parse_hex_u16)]
    pub reply: Option<u16>,
}

impl SendCommand {
    pub fn message(&self) -> Result<Message> {
        let cleaned: String = self.frame.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&cleaned).context("Frame is not valid hex")?;
        let (message, used) = decode(&bytes).map_err(|e| anyhow!("Invalid frame: {e}"))?;
        if used != bytes.len() {
            anyhow::bail!("{} trailing byte(s) after the frame", bytes.len() - used);
        }
        Ok(message)
    }
}

impl DeviceTask for SendCommand {
    fn run<M: MotorModel>(self, device: MotorController<M>) -> Result<()> {
        let message = self.message()?;
        let Some(reply) = self.reply else {
            device.connection().send(&message)?;
            println!("➡️  {message}");
            return Ok(());
        };

        let reply = MessageId::try_from(reply).map_err(|_| anyhow!("Unknown reply id 0x{reply:04x}"))?;
        let answer = device.core().request(&message, reply, "send")?;
        println!("⬅️  {answer}");
        println!("{}", hex::encode(encode(&answer)?));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apt_sdk::protocol::EndPoint;

    fn command(frame: &str) -> SendCommand {
        SendCommand {
            frame: frame.to_string(),
            reply: None,
        }
    }

    #[test]
    fn test_parse_identify_frame() {
        // MOD_IDENTIFY，chan 0，USB 控制器
        let message = command("23 02 00 00 50 01").message().unwrap();
        assert_eq!(message.kind(), Some(MessageId::ModIdentify));
        assert_eq!(message.dest, EndPoint::Usb);
        assert_eq!(message.source, EndPoint::Host);
    }

    #[test]
    fn test_rejects_bad_frames() {
        assert!(command("zz").message().is_err());
        assert!(command("2302").message().is_err());
        assert!(command("23020000500100").message().is_err());
    }
}
