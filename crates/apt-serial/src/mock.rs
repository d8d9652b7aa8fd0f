//! 内存模拟串口
//!
//! 用于在没有硬件的情况下驱动收发线程：
//! - [`MockHandle::inject`] 向读端注入字节（可以任意切块）
//! - [`MockHandle::fail`] 让下一次读取返回 I/O 错误，模拟拔线
//! - [`MockHandle::set_responder`] 按写入的每条消息生成应答，模拟设备
//!
//! 写入按字节逐个追加到共享日志，每个字节之后让出 CPU，
//! 因此如果上层没有串行化写入，日志中会出现交错的消息。

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;

use crate::{RxAdapter, SerialAdapter, SerialError, SplittableAdapter, TxAdapter};

enum MockEvent {
    Data(Vec<u8>),
    Fail,
}

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

struct Shared {
    written: Mutex<Vec<u8>>,
    write_fail: AtomicBool,
    responder: Mutex<Option<Responder>>,
    inject: Sender<MockEvent>,
}

/// 测试侧句柄
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    /// 注入一块接收数据
    pub fn inject(&self, bytes: &[u8]) {
        let _ = self.shared.inject.send(MockEvent::Data(bytes.to_vec()));
    }

    /// 让读端在消费完已注入的数据后返回 I/O 错误
    pub fn fail(&self) {
        let _ = self.shared.inject.send(MockEvent::Fail);
    }

    /// 让后续写入失败
    pub fn fail_writes(&self, fail: bool) {
        self.shared.write_fail.store(fail, Ordering::SeqCst);
    }

    /// 到目前为止写出的全部字节
    pub fn written(&self) -> Vec<u8> {
        self.shared.written.lock().clone()
    }

    /// 取出并清空写日志
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut *self.shared.written.lock())
    }

    /// 设置应答函数：每次 `write_all` 以整条写入内容调用，返回值注入读端
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        *self.shared.responder.lock() = Some(Box::new(responder));
    }
}

/// 模拟串口（未拆分）
pub struct MockSerial {
    rx: MockRx,
    tx: MockTx,
}

impl MockSerial {
    /// 创建模拟串口及其测试句柄，读超时 10ms
    pub fn new() -> (Self, MockHandle) {
        Self::with_read_timeout(Duration::from_millis(10))
    }

    pub fn with_read_timeout(read_timeout: Duration) -> (Self, MockHandle) {
        let (inject, events) = unbounded();
        let shared = Arc::new(Shared {
            written: Mutex::new(Vec::new()),
            write_fail: AtomicBool::new(false),
            responder: Mutex::new(None),
            inject,
        });
        let serial = Self {
            rx: MockRx {
                events,
                pending: VecDeque::new(),
                read_timeout,
            },
            tx: MockTx { shared: shared.clone() },
        };
        (serial, MockHandle { shared })
    }
}

impl SerialAdapter for MockSerial {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        self.tx.write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.rx.read(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.rx.read_timeout = timeout;
        Ok(())
    }
}

impl SplittableAdapter for MockSerial {
    type RxAdapter = MockRx;
    type TxAdapter = MockTx;

    fn split(self) -> Result<(MockRx, MockTx), SerialError> {
        Ok((self.rx, self.tx))
    }
}

/// 模拟接收半边
pub struct MockRx {
    events: Receiver<MockEvent>,
    pending: VecDeque<u8>,
    read_timeout: Duration,
}

impl MockRx {
    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        n
    }
}

impl RxAdapter for MockRx {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        if !self.pending.is_empty() {
            return Ok(self.drain_pending(buf));
        }
        match self.events.recv_timeout(self.read_timeout) {
            Ok(MockEvent::Data(bytes)) => {
                self.pending.extend(bytes);
                Ok(self.drain_pending(buf))
            },
            Ok(MockEvent::Fail) => Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock serial failure",
            ))),
            Err(RecvTimeoutError::Timeout) => Err(SerialError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(SerialError::Closed),
        }
    }
}

/// 模拟发送半边
pub struct MockTx {
    shared: Arc<Shared>,
}

impl TxAdapter for MockTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        if self.shared.write_fail.load(Ordering::SeqCst) {
            return Err(SerialError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock write failure",
            )));
        }
        for byte in bytes {
            self.shared.written.lock().push(*byte);
            thread::yield_now();
        }
        let reply = self.shared.responder.lock().as_mut().and_then(|respond| respond(bytes));
        if let Some(reply) = reply {
            let _ = self.shared.inject.send(MockEvent::Data(reply));
        }
        Ok(())
    }
}
