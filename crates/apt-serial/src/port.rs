//! 基于 `serialport` 的真实串口适配器
//!
//! 拆分时通过 `try_clone` 得到同一端口的第二个句柄，读写各占一个，
//! 读线程阻塞在 `read` 上时写线程仍可发送。

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace};

use crate::{FlowControl, RxAdapter, SerialAdapter, SerialConfig, SerialError, SplittableAdapter, TxAdapter};

/// RTS 脉冲前后的等待时间
const RESET_SETTLE: Duration = Duration::from_millis(50);

fn map_read(result: std::io::Result<usize>) -> Result<usize, SerialError> {
    match result {
        Ok(0) => Err(SerialError::Timeout),
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(SerialError::Timeout),
        Err(e) => Err(SerialError::Io(e)),
    }
}

/// 已打开的串口
pub struct SerialPortAdapter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl std::fmt::Debug for SerialPortAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortAdapter").field("name", &self.name).finish()
    }
}

impl SerialPortAdapter {
    /// 按 APT 要求的参数打开串口
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, SerialError> {
        info!("Opening serial port {} at {} baud", path, config.baud_rate);
        let mut port = serialport::new(path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(match config.flow_control {
                FlowControl::None => serialport::FlowControl::None,
                FlowControl::Hardware => serialport::FlowControl::Hardware,
            })
            .timeout(config.read_timeout)
            .open()?;

        if config.reset_on_open {
            // 控制器在 RTS 脉冲后丢弃未完成的命令
            thread::sleep(RESET_SETTLE);
            port.write_request_to_send(true)?;
            port.clear(ClearBuffer::All)?;
            thread::sleep(RESET_SETTLE);
            port.write_request_to_send(false)?;
            debug!("RTS pulsed and buffers cleared on {}", path);
        }

        Ok(Self {
            port,
            name: path.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SerialAdapter for SerialPortAdapter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        trace!("tx {} bytes", bytes.len());
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        map_read(self.port.read(buf))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.port.set_timeout(timeout)?;
        Ok(())
    }
}

impl SplittableAdapter for SerialPortAdapter {
    type RxAdapter = SerialRxAdapter;
    type TxAdapter = SerialTxAdapter;

    fn split(self) -> Result<(SerialRxAdapter, SerialTxAdapter), SerialError> {
        let tx = self.port.try_clone()?;
        Ok((
            SerialRxAdapter {
                port: self.port,
                name: self.name.clone(),
            },
            SerialTxAdapter { port: tx, name: self.name },
        ))
    }
}

/// 接收半边
pub struct SerialRxAdapter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl RxAdapter for SerialRxAdapter {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        map_read(self.port.read(buf))
    }
}

impl Drop for SerialRxAdapter {
    fn drop(&mut self) {
        debug!("Serial rx handle for {} released", self.name);
    }
}

/// 发送半边
pub struct SerialTxAdapter {
    port: Box<dyn SerialPort>,
    name: String,
}

impl TxAdapter for SerialTxAdapter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        trace!("tx {} bytes on {}", bytes.len(), self.name);
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}
