//! 设备核心与按型号区分的控制器
//!
//! [`DeviceCore`] 持有连接和选项，实现所有运动等待逻辑；
//! [`MotorController<M>`] 用型号标记把能力 trait 限定到支持它们的型号上。

use std::marker::PhantomData;

use apt_driver::{AptConnection, ConnectionBuilder, DeviceStatus};
use apt_protocol::{EndPoint, Message, MessageId, commands};
use apt_serial::{DeviceFilter, SplittableAdapter};
use tracing::{debug, info};

use crate::capabilities::{AptDevice, EncoderMotor, Motor, MultiBay, SingleChannel, Triggered};
use crate::error::{DeviceError, Result};
use crate::models::{EncoderModel, Model, MotorModel, MultiBayModel, SingleChannelModel, TriggerModel};
use crate::options::DeviceOptions;

/// 所有设备共享的核心：连接、寻址与选项
pub struct DeviceCore {
    connection: AptConnection,
    options: DeviceOptions,
    name: &'static str,
}

impl DeviceCore {
    pub fn new(connection: AptConnection, options: DeviceOptions, name: &'static str) -> Self {
        Self {
            connection,
            options,
            name,
        }
    }

    pub fn connection(&self) -> &AptConnection {
        &self.connection
    }

    pub(crate) fn connection_mut(&mut self) -> &mut AptConnection {
        &mut self.connection
    }

    pub fn options(&self) -> &DeviceOptions {
        &self.options
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 把 (bay, 通道) 序号解析为目标端点和 `chan_ident`
    pub fn target(&self, bay: usize, channel: usize) -> Result<(EndPoint, u8)> {
        let addressing = self.connection.addressing();
        let invalid = || DeviceError::InvalidAddress { bay, channel };
        let dest = addressing.bay_endpoint(bay).ok_or_else(invalid)?;
        let chan = addressing
            .chan_ident(channel)
            .and_then(|c| u8::try_from(c).ok())
            .ok_or_else(invalid)?;
        Ok((dest, chan))
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        Ok(self.connection.send(message)?)
    }

    /// 非阻塞状态快照
    pub fn snapshot(&self, bay: usize, channel: usize) -> Result<DeviceStatus> {
        self.connection
            .status(bay, channel)
            .ok_or(DeviceError::InvalidAddress { bay, channel })
    }

    /// 发送请求并等待同一端点的应答
    pub fn request(&self, message: &Message, reply: MessageId, operation: &'static str) -> Result<Message> {
        let timeout = self.options.motion.reply_timeout;
        self.connection
            .request(message, reply, message.dest, timeout)
            .map_err(DeviceError::timeout(operation, timeout))
    }

    /// 发送一条运动指令，按等待策略阻塞到运动结束
    ///
    /// `MOT_MOVE_COMPLETED` 与 `MOT_MOVE_STOPPED` 都视为运动结束。
    pub fn run_move(&self, bay: usize, channel: usize, message: &Message, operation: &'static str) -> Result<()> {
        let baseline = self.snapshot(bay, channel)?.move_events();
        self.send(message)?;
        if !self.options.motion.wait {
            return Ok(());
        }

        let timeout = self.options.motion.move_timeout;
        self.connection
            .wait_for(bay, channel, |s| s.move_events() > baseline, timeout)
            .map_err(DeviceError::timeout(operation, timeout))?;
        debug!("{} finished on bay {} channel {}", operation, bay, channel);
        Ok(())
    }

    /// 对一个通道回零
    pub fn home(&self, bay: usize, channel: usize) -> Result<()> {
        let (dest, chan) = self.target(bay, channel)?;
        let baseline = self.snapshot(bay, channel)?;
        self.send(&commands::mot_move_home(dest, chan))?;
        if self.options.motion.wait {
            self.wait_homed(bay, channel, &baseline)?;
        }
        Ok(())
    }

    /// 对所有通道同时回零，再依次等待
    pub fn home_all(&self) -> Result<()> {
        let addressing = self.connection.addressing();
        let slots: Vec<(usize, usize)> = (0..addressing.bays.len())
            .flat_map(|bay| (0..addressing.channels.len()).map(move |channel| (bay, channel)))
            .collect();

        let mut baselines = Vec::with_capacity(slots.len());
        for &(bay, channel) in &slots {
            let (dest, chan) = self.target(bay, channel)?;
            baselines.push(self.snapshot(bay, channel)?);
            self.send(&commands::mot_move_home(dest, chan))?;
        }
        if self.options.motion.wait {
            for (&(bay, channel), baseline) in slots.iter().zip(&baselines) {
                self.wait_homed(bay, channel, baseline)?;
            }
        }
        Ok(())
    }

    /// 等待回零完成
    ///
    /// 完成条件：收到 `MOT_MOVE_HOMED`，或发送之后的状态显示已回零且不在回零中。
    /// 发送前已经处于已回零状态时，还要求之后出现过一次新的回零中。
    fn wait_homed(&self, bay: usize, channel: usize, baseline: &DeviceStatus) -> Result<()> {
        let timeout = self.options.motion.home_timeout;
        self.connection
            .wait_for(
                bay,
                channel,
                |s| {
                    let restarted = !baseline.is_homed() || s.homing_starts > baseline.homing_starts;
                    s.homed_events > baseline.homed_events || (s.seq > baseline.seq && s.is_homed() && restarted)
                },
                timeout,
            )
            .map_err(DeviceError::timeout("home", timeout))?;
        info!("{} bay {} channel {} homed", self.name, bay, channel);
        Ok(())
    }
}

/// 按型号区分的控制器
///
/// 可用操作由型号 `M` 实现的能力标记决定，例如 `MotorController<Bbd203>`
/// 实现 [`Motor`]、[`EncoderMotor`]、[`Triggered`] 和 [`MultiBay`]，
/// 而 `MotorController<GenericController>` 只有 [`AptDevice`]。
///
/// # Example
///
/// ```no_run
/// use apt_device::{AptDevice, DeviceOptions, Motor, MotorController, SingleChannel, models::Kdc101};
///
/// let device = MotorController::<Kdc101>::open(DeviceOptions::for_model::<Kdc101>()).unwrap();
/// device.identify().unwrap();
/// device.home(0, 0).unwrap();
/// device.move_relative(1000, 0, 0).unwrap();
/// println!("position: {}", device.status().position);
/// ```
pub struct MotorController<M: Model> {
    core: DeviceCore,
    _model: PhantomData<M>,
}

impl<M: Model> MotorController<M> {
    /// 按型号的序列号前缀自动查找并打开
    pub fn open(options: DeviceOptions) -> Result<Self> {
        let filter = DeviceFilter {
            serial_number: M::SERIAL_PREFIX.map(str::to_string),
            ..DeviceFilter::default()
        };
        Self::open_matching(filter, options)
    }

    /// 打开第一个符合条件的串口
    pub fn open_matching(filter: DeviceFilter, options: DeviceOptions) -> Result<Self> {
        let connection = Self::builder(&options).filter(filter).build()?;
        Self::finish(connection, options)
    }

    /// 打开指定串口
    pub fn open_port(port: &str, options: DeviceOptions) -> Result<Self> {
        let connection = Self::builder(&options).port(port).build()?;
        Self::finish(connection, options)
    }

    /// 在给定适配器上打开（测试中配合模拟串口使用）
    pub fn from_adapter<A>(adapter: A, options: DeviceOptions) -> Result<Self>
    where
        A: SplittableAdapter,
        A::RxAdapter: Send + 'static,
        A::TxAdapter: Send + 'static,
    {
        let connection = Self::builder(&options).build_with(adapter)?;
        Self::finish(connection, options)
    }

    fn builder(options: &DeviceOptions) -> ConnectionBuilder {
        let addressing = apt_driver::Addressing {
            bays: M::BAYS.to_vec(),
            channels: M::CHANNELS.to_vec(),
            swap_limit_switches: options.swap_limit_switches,
        };
        ConnectionBuilder::new()
            .controller(M::CONTROLLER)
            .addressing(addressing)
            .serial_config(options.serial.clone())
            .pipeline_config(options.pipeline.clone())
    }

    fn finish(connection: AptConnection, options: DeviceOptions) -> Result<Self> {
        let home_on_open = options.home_on_open;
        let device = Self {
            core: DeviceCore::new(connection, options, M::NAME),
            _model: PhantomData,
        };
        info!("{} opened", M::NAME);
        if home_on_open {
            device.core.home_all()?;
        }
        Ok(device)
    }

    pub fn name(&self) -> &'static str {
        M::NAME
    }

    /// 底层连接（直接收发消息）
    pub fn connection(&self) -> &AptConnection {
        self.core.connection()
    }
}

impl<M: Model> AptDevice for MotorController<M> {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }
}

impl<M: MotorModel> Motor for MotorController<M> {}
impl<M: EncoderModel> EncoderMotor for MotorController<M> {}
impl<M: TriggerModel> Triggered for MotorController<M> {}
impl<M: MultiBayModel> MultiBay for MotorController<M> {}
impl<M: SingleChannelModel> SingleChannel for MotorController<M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bbd202, Kdc101};
    use crate::options::MotionConfig;
    use apt_driver::PipelineConfig;
    use apt_protocol::{Direction, Unpacker, Value, encode};
    use apt_serial::{MockHandle, MockSerial};
    use std::time::{Duration, Instant};

    /// 状态字第 10 位：已回零
    const HOMED_BIT: u32 = 1 << 10;

    fn quiet_options<M: Model>() -> DeviceOptions {
        DeviceOptions::for_model::<M>()
            .with_pipeline(PipelineConfig {
                keepalive_interval: None,
                ..PipelineConfig::default()
            })
            .with_motion(MotionConfig {
                move_timeout: Duration::from_millis(300),
                home_timeout: Duration::from_millis(300),
                reply_timeout: Duration::from_millis(300),
                ..MotionConfig::default()
            })
    }

    fn open<M: Model>() -> (MotorController<M>, MockHandle) {
        let (serial, handle) = MockSerial::new();
        let device = MotorController::<M>::from_adapter(serial, quiet_options::<M>()).unwrap();
        (device, handle)
    }

    fn status_frame(id: MessageId, source: EndPoint, position: i32, bits: u32) -> Vec<u8> {
        let message = Message::new(
            id,
            EndPoint::Host,
            source,
            [
                Value::U16(1),
                Value::I32(position),
                Value::I16(0),
                Value::U16(0),
                Value::U32(bits),
            ],
        )
        .unwrap();
        encode(&message).unwrap()
    }

    fn written(handle: &MockHandle) -> Vec<Message> {
        let mut unpacker = Unpacker::new();
        unpacker.feed(&handle.take_written());
        unpacker.collect()
    }

    #[test]
    fn test_move_absolute_waits_for_completion() {
        let (device, handle) = open::<Kdc101>();
        handle.set_responder(|bytes| {
            let (message, _) = apt_protocol::decode(bytes).ok()?;
            (message.kind() == Some(MessageId::MotMoveAbsolute)).then(|| {
                let position = message.field_i64("position").unwrap_or(0) as i32;
                status_frame(MessageId::MotMoveCompleted, EndPoint::Usb, position, 0)
            })
        });

        device.move_absolute(5000, 0, 0).unwrap();
        let status = device.core().snapshot(0, 0).unwrap();
        assert_eq!(status.position, 5000);
        assert_eq!(status.moves_completed, 1);
    }

    #[test]
    fn test_move_times_out() {
        let (device, _handle) = open::<Kdc101>();
        let start = Instant::now();
        let err = device.move_relative(100, 0, 0).unwrap_err();
        assert!(matches!(err, DeviceError::Timeout { operation: "move_relative", .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_home_completes_on_status_bits() {
        let (device, handle) = open::<Kdc101>();
        handle.set_responder(|bytes| {
            let (message, _) = apt_protocol::decode(bytes).ok()?;
            (message.kind() == Some(MessageId::MotMoveHome))
                .then(|| status_frame(MessageId::MotGetDcStatusUpdate, EndPoint::Usb, 0, HOMED_BIT))
        });

        device.home(0, 0).unwrap();
        assert!(device.status().is_homed());
    }

    #[test]
    fn test_direction_inversion() {
        let (device, handle) = open::<Kdc101>();
        handle.take_written();
        device.move_velocity(Direction::Forward, 0, 0).unwrap();
        device.move_jog(Direction::Reverse, 0, 0).unwrap();
        let sent = written(&handle);
        assert_eq!(sent[0].field_i64("direction"), Some(2));
        assert_eq!(sent[1].field_i64("direction"), Some(1));
    }

    #[test]
    fn test_rack_addressing() {
        let (device, handle) = open::<Bbd202>();
        handle.take_written();
        device.stop(true, 1, 0).unwrap();
        device.identify().unwrap();
        device.identify_channel(0).unwrap();
        let sent = written(&handle);
        assert_eq!(sent[0].dest, EndPoint::Bay1);
        assert_eq!(sent[0].field_i64("stop_mode"), Some(1));
        assert_eq!(sent[1].dest, EndPoint::Usb);
        assert_eq!(sent[1].chan_ident(), Some(0));
        assert_eq!(sent[2].dest, EndPoint::Rack);
        assert_eq!(sent[2].chan_ident(), Some(1));

        assert!(matches!(
            device.move_absolute(0, 2, 0),
            Err(DeviceError::InvalidAddress { bay: 2, channel: 0 })
        ));
        assert_eq!(device.statuses().len(), 2);
    }

    #[test]
    fn test_no_wait_returns_immediately() {
        let (serial, handle) = MockSerial::new();
        let mut options = quiet_options::<Kdc101>();
        options.motion.wait = false;
        let device = MotorController::<Kdc101>::from_adapter(serial, options).unwrap();
        handle.take_written();
        device.move_relative(-20, 0, 0).unwrap();
        let sent = written(&handle);
        assert_eq!(sent[0].kind(), Some(MessageId::MotMoveRelative));
        assert_eq!(sent[0].field_i64("distance"), Some(-20));
    }

    #[test]
    fn test_home_on_open() {
        let (serial, handle) = MockSerial::new();
        handle.set_responder(|bytes| {
            let (message, _) = apt_protocol::decode(bytes).ok()?;
            if message.kind() != Some(MessageId::MotMoveHome) {
                return None;
            }
            let homed = Message::new(MessageId::MotMoveHomed, EndPoint::Host, message.dest, [Value::U8(1)]).ok()?;
            encode(&homed).ok()
        });
        let options = quiet_options::<Bbd202>().home_on_open(true);
        let device = MotorController::<Bbd202>::from_adapter(serial, options).unwrap();
        let statuses = device.statuses();
        assert!(statuses.iter().all(|bay| bay[0].homed_events == 1));
    }
}
