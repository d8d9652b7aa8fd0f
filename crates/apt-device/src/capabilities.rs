//! 能力 trait
//!
//! 每个 trait 只要求访问 [`DeviceCore`]，操作以默认方法实现；
//! 设备类型通过空 `impl` 获得对应能力。
//!
//! 所有运动类方法的 `bay`/`channel` 参数是序号（从 0 开始），
//! 由连接的寻址表换算为端点和 `chan_ident`。

use std::sync::Arc;

use apt_driver::{DeviceStatus, Event, Filter, MetricsSnapshot, SubscriptionId};
use apt_protocol::{
    Direction, EndPoint, ErrorReport, HardwareInfo, HomeParams, JogParams, Message, MessageId, ProtocolError,
    StopMode, VelocityParams, commands,
};

use crate::device::DeviceCore;
use crate::error::Result;

/// 基础能力：所有 APT 控制器都支持
pub trait AptDevice {
    fn core(&self) -> &DeviceCore;

    fn core_mut(&mut self) -> &mut DeviceCore;

    /// 让控制器面板指示灯闪烁
    fn identify(&self) -> Result<()> {
        self.core().send(&commands::mod_identify(EndPoint::Usb, 0))
    }

    /// 让机架上的某个通道指示灯闪烁
    fn identify_channel(&self, channel: usize) -> Result<()> {
        let core = self.core();
        let (_, chan) = core.target(0, channel)?;
        core.send(&commands::mod_identify(core.connection().controller(), chan))
    }

    /// 请求硬件信息（型号、序列号、固件版本）
    fn request_info(&self) -> Result<HardwareInfo> {
        let core = self.core();
        let controller = core.connection().controller();
        let reply = core.request(&commands::hw_req_info(controller), MessageId::HwGetInfo, "request_info")?;
        Ok(HardwareInfo::try_from(&reply)?)
    }

    /// 注册设备错误回调（`HW_RESPONSE` / `HW_RICHRESPONSE`）
    ///
    /// 回调在分发线程上执行，不应长时间阻塞。
    fn register_error_callback<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ErrorReport) + Send + Sync + 'static,
    {
        self.core().connection().subscribe(
            Filter::Error,
            Arc::new(move |event: &Event| {
                if let Event::Error(report) = event {
                    callback(report);
                }
            }),
        )
    }

    /// 注册某类消息的回调
    fn register_callback<F>(&self, kind: MessageId, callback: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.core().connection().subscribe(
            Filter::Kind(kind),
            Arc::new(move |event: &Event| {
                if let Event::Message(message) = event {
                    callback(message);
                }
            }),
        )
    }

    /// 注册断线回调
    fn register_disconnect_callback<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.core()
            .connection()
            .subscribe(Filter::Disconnect, Arc::new(move |_: &Event| callback()))
    }

    fn unregister_callback(&self, id: SubscriptionId) -> bool {
        self.core().connection().unsubscribe(id)
    }

    fn is_open(&self) -> bool {
        self.core().connection().is_open()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.core().connection().metrics()
    }

    /// 关闭连接；之后的指令返回 `NotConnected`
    fn close(&mut self) {
        self.core_mut().connection_mut().close();
    }
}

/// 预先设置参数、稍后触发的运动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreparedMove {
    Absolute,
    Relative,
}

/// 电机运动能力
pub trait Motor: AptDevice {
    /// 回零；按等待策略阻塞到回零完成
    fn home(&self, bay: usize, channel: usize) -> Result<()> {
        self.core().home(bay, channel)
    }

    /// 移动到绝对位置（编码器计数）
    fn move_absolute(&self, position: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.run_move(
            bay,
            channel,
            &commands::mot_move_absolute(dest, chan, position),
            "move_absolute",
        )
    }

    /// 相对移动（编码器计数）
    fn move_relative(&self, distance: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.run_move(
            bay,
            channel,
            &commands::mot_move_relative(dest, chan, distance),
            "move_relative",
        )
    }

    /// 只设置绝对移动目标，不启动运动
    fn prepare_move_absolute(&self, position: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_move_abs_params(dest, chan, position))
    }

    /// 只设置相对移动距离，不启动运动
    fn prepare_move_relative(&self, distance: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_move_rel_params(dest, chan, distance))
    }

    /// 按之前设置的参数启动运动（短帧形式，不携带位置）
    fn start_prepared_move(&self, kind: PreparedMove, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let (id, operation) = match kind {
            PreparedMove::Absolute => (MessageId::MotMoveAbsolute, "move_absolute"),
            PreparedMove::Relative => (MessageId::MotMoveRelative, "move_relative"),
        };
        let message = Message::raw_short(id.raw(), dest, EndPoint::Host, [chan, 0]);
        core.run_move(bay, channel, &message, operation)
    }

    /// 停止运动；`immediate` 为 `false` 时按加速度曲线减速
    fn stop(&self, immediate: bool, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let mode = if immediate { StopMode::Immediate } else { StopMode::Profiled };
        core.send(&commands::mot_move_stop(dest, chan, mode))
    }

    /// 以最大速度持续运动，直到 `stop`
    fn move_velocity(&self, direction: Direction, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let direction = direction.inverted_if(core.options().invert_direction_logic);
        core.send(&commands::mot_move_velocity(dest, chan, direction))
    }

    /// 按点动参数点动一次
    fn move_jog(&self, direction: Direction, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let direction = direction.inverted_if(core.options().invert_direction_logic);
        core.send(&commands::mot_move_jog(dest, chan, direction))
    }

    /// 设置加速度和最大速度（最小速度固定为 0）
    fn set_velocity_params(&self, acceleration: i32, max_velocity: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let params = VelocityParams {
            min_velocity: 0,
            acceleration,
            max_velocity,
        };
        core.send(&commands::mot_set_vel_params(dest, chan, &params))
    }

    fn set_jog_params(&self, params: &JogParams, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_jog_params(dest, chan, params))
    }

    /// 设置反向间隙补偿距离
    fn set_move_params(&self, backlash_distance: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_gen_move_params(dest, chan, backlash_distance))
    }

    fn set_home_params(&self, params: &HomeParams, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_home_params(dest, chan, params))
    }

    /// 使能或禁用电机驱动
    fn set_enabled(&self, enabled: bool, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mod_set_chan_enable_state(dest, chan, enabled.into()))
    }

    /// 设置面板指示灯模式，位定义见 [`apt_protocol::commands::led_mode`]
    fn set_led_mode(&self, mode_bits: u16, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_av_modes(dest, chan, mode_bits))
    }

    /// 重设当前位置计数
    fn set_position_counter(&self, position: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_pos_counter(dest, chan, position))
    }

    /// 请求回读速度、点动、间隙与回零参数
    ///
    /// 应答异步到达并合并进状态快照。
    fn request_params(&self, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_req_vel_params(dest, chan))?;
        core.send(&commands::mot_req_jog_params(dest, chan))?;
        core.send(&commands::mot_req_home_params(dest, chan))?;
        if let Some(message) = commands::mot_request(MessageId::MotReqGenMoveParams, dest, chan) {
            core.send(&message)?;
        }
        Ok(())
    }
}

/// 编码器计数器
pub trait EncoderMotor: Motor {
    fn set_encoder_counter(&self, count: i32, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_enc_counter(dest, chan, count))
    }

    /// 读取编码器计数（阻塞到应答或超时）
    fn request_encoder_counter(&self, bay: usize, channel: usize) -> Result<i32> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let reply = core.request(
            &commands::mot_req_enc_counter(dest, chan),
            MessageId::MotGetEncCounter,
            "request_encoder_counter",
        )?;
        reply
            .field_i64("encoder_count")
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| missing("MOT_GET_ENCCOUNTER", "encoder_count"))
    }
}

/// 触发输入/输出
pub trait Triggered: Motor {
    fn set_trigger_mode(&self, mode: u8, bay: usize, channel: usize) -> Result<()> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        core.send(&commands::mot_set_trigger(dest, chan, mode))
    }

    fn request_trigger_mode(&self, bay: usize, channel: usize) -> Result<u8> {
        let core = self.core();
        let (dest, chan) = core.target(bay, channel)?;
        let reply = core.request(
            &commands::mot_req_trigger(dest, chan),
            MessageId::MotGetTrigger,
            "request_trigger_mode",
        )?;
        reply
            .field_i64("mode")
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| missing("MOT_GET_TRIGGER", "mode"))
    }
}

/// 多 bay 设备的状态视图
pub trait MultiBay: AptDevice {
    /// 单个 (bay, 通道) 的状态快照
    fn bay_status(&self, bay: usize, channel: usize) -> Result<DeviceStatus> {
        self.core().snapshot(bay, channel)
    }

    /// 全部状态，外层按 bay、内层按通道排列
    fn statuses(&self) -> Vec<Vec<DeviceStatus>> {
        self.core().connection().statuses()
    }

    fn bay_count(&self) -> usize {
        self.core().connection().addressing().bays.len()
    }
}

/// 单通道设备的扁平状态视图
pub trait SingleChannel: AptDevice {
    fn status(&self) -> DeviceStatus {
        self.core().connection().status(0, 0).unwrap_or_default()
    }
}

fn missing(message: &'static str, field: &'static str) -> crate::error::DeviceError {
    ProtocolError::MissingField { message, field }.into()
}
