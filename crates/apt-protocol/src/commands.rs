//! 指令构建
//!
//! 每个函数构建一条由主机发出的消息（源地址固定为 [`EndPoint::Host`]）。
//! 字段类型由函数签名保证与布局表一致，因此这里直接构造，不再走 `Message::new` 的校验。

use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::smallvec;

use crate::endpoint::EndPoint;
use crate::ids::MessageId;
use crate::message::{Fields, Message, MessageData, Value};
use crate::params::{HomeParams, JogParams, VelocityParams};

/// 运动方向（线上值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Direction {
    Forward = 1,
    Reverse = 2,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    /// 方向逻辑反转时取反
    pub fn inverted_if(self, invert: bool) -> Self {
        if invert { self.reversed() } else { self }
    }
}

/// 停止方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum StopMode {
    Immediate = 1,
    /// 按加速度曲线减速停止
    #[default]
    Profiled = 2,
}

/// 点动方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum JogMode {
    Continuous = 1,
    #[default]
    SingleStep = 2,
}

/// 通道使能状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum EnableState {
    Enabled = 1,
    Disabled = 2,
}

impl From<bool> for EnableState {
    fn from(enabled: bool) -> Self {
        if enabled { EnableState::Enabled } else { EnableState::Disabled }
    }
}

/// 前面板 LED 模式位（`MOT_SET_AVMODES`）
pub mod led_mode {
    /// 收到 `MOD_IDENTIFY` 时闪烁
    pub const IDENT: u16 = 0x01;
    /// 触碰限位时闪烁
    pub const LIMIT_SWITCH: u16 = 0x02;
    /// 运动中常亮
    pub const MOVING: u16 = 0x08;
}

fn host_message(id: MessageId, dest: EndPoint, fields: Fields) -> Message {
    Message {
        id: id.raw(),
        dest,
        source: EndPoint::Host,
        data: MessageData::Fields(fields),
    }
}

fn no_params(id: MessageId, dest: EndPoint) -> Message {
    host_message(id, dest, Fields::new())
}

fn chan_only(id: MessageId, dest: EndPoint, chan: u8) -> Message {
    host_message(id, dest, Fields(smallvec![Value::U8(chan)]))
}

fn chan_param(id: MessageId, dest: EndPoint, chan: u8, param: u8) -> Message {
    host_message(id, dest, Fields(smallvec![Value::U8(chan), Value::U8(param)]))
}

fn chan_i32(id: MessageId, dest: EndPoint, chan: u8, value: i32) -> Message {
    host_message(id, dest, Fields(smallvec![Value::U16(chan.into()), Value::I32(value)]))
}

// ============================================================================
// 通用指令
// ============================================================================

pub fn hw_disconnect(dest: EndPoint) -> Message {
    no_params(MessageId::HwDisconnect, dest)
}

pub fn hw_req_info(dest: EndPoint) -> Message {
    no_params(MessageId::HwReqInfo, dest)
}

/// 开启周期性状态上报
pub fn hw_start_update_msgs(dest: EndPoint) -> Message {
    no_params(MessageId::HwStartUpdateMsgs, dest)
}

pub fn hw_stop_update_msgs(dest: EndPoint) -> Message {
    no_params(MessageId::HwStopUpdateMsgs, dest)
}

/// 让设备前面板闪烁以便识别
pub fn mod_identify(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::ModIdentify, dest, chan)
}

pub fn mod_set_chan_enable_state(dest: EndPoint, chan: u8, state: EnableState) -> Message {
    chan_param(MessageId::ModSetChanEnableState, dest, chan, state.into())
}

pub fn mod_req_chan_enable_state(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::ModReqChanEnableState, dest, chan)
}

// ============================================================================
// 查询指令
// ============================================================================

/// 仅携带通道号的查询指令
///
/// 返回 `None` 表示该 ID 不是"单通道参数短帧"。
pub fn mot_request(id: MessageId, dest: EndPoint, chan: u8) -> Option<Message> {
    let entry = id.layout()?;
    let is_chan_request = !entry.is_long() && entry.fields.len() == 1 && entry.fields[0].name == "chan_ident";
    is_chan_request.then(|| chan_only(id, dest, chan))
}

pub fn mot_req_status_update(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqStatusUpdate, dest, chan)
}

pub fn mot_req_dc_status_update(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqDcStatusUpdate, dest, chan)
}

pub fn mot_req_status_bits(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqStatusBits, dest, chan)
}

pub fn mot_req_enc_counter(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqEncCounter, dest, chan)
}

pub fn mot_req_pos_counter(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqPosCounter, dest, chan)
}

pub fn mot_req_vel_params(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqVelParams, dest, chan)
}

pub fn mot_req_jog_params(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqJogParams, dest, chan)
}

pub fn mot_req_home_params(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqHomeParams, dest, chan)
}

pub fn mot_req_trigger(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotReqTrigger, dest, chan)
}

/// USB 控制器需要定期收到此消息才会继续上报状态
pub fn mot_ack_dc_status_update(dest: EndPoint) -> Message {
    no_params(MessageId::MotAckDcStatusUpdate, dest)
}

// ============================================================================
// 参数设置
// ============================================================================

pub fn mot_set_enc_counter(dest: EndPoint, chan: u8, count: i32) -> Message {
    chan_i32(MessageId::MotSetEncCounter, dest, chan, count)
}

pub fn mot_set_pos_counter(dest: EndPoint, chan: u8, position: i32) -> Message {
    chan_i32(MessageId::MotSetPosCounter, dest, chan, position)
}

pub fn mot_set_vel_params(dest: EndPoint, chan: u8, params: &VelocityParams) -> Message {
    host_message(
        MessageId::MotSetVelParams,
        dest,
        Fields(smallvec![
            Value::U16(chan.into()),
            Value::I32(params.min_velocity),
            Value::I32(params.acceleration),
            Value::I32(params.max_velocity),
        ]),
    )
}

pub fn mot_set_jog_params(dest: EndPoint, chan: u8, params: &JogParams) -> Message {
    host_message(
        MessageId::MotSetJogParams,
        dest,
        Fields(smallvec![
            Value::U16(chan.into()),
            Value::U16(params.jog_mode.into()),
            Value::I32(params.step_size),
            Value::I32(params.min_velocity),
            Value::I32(params.acceleration),
            Value::I32(params.max_velocity),
            Value::U16(u8::from(params.stop_mode).into()),
        ]),
    )
}

/// 设置反向间隙补偿距离
pub fn mot_set_gen_move_params(dest: EndPoint, chan: u8, backlash_distance: i32) -> Message {
    chan_i32(MessageId::MotSetGenMoveParams, dest, chan, backlash_distance)
}

pub fn mot_set_home_params(dest: EndPoint, chan: u8, params: &HomeParams) -> Message {
    host_message(
        MessageId::MotSetHomeParams,
        dest,
        Fields(smallvec![
            Value::U16(chan.into()),
            Value::U16(params.home_direction),
            Value::U16(params.limit_switch),
            Value::I32(params.home_velocity),
            Value::I32(params.offset_distance),
        ]),
    )
}

pub fn mot_set_move_rel_params(dest: EndPoint, chan: u8, relative_distance: i32) -> Message {
    chan_i32(MessageId::MotSetMoveRelParams, dest, chan, relative_distance)
}

pub fn mot_set_move_abs_params(dest: EndPoint, chan: u8, absolute_position: i32) -> Message {
    chan_i32(MessageId::MotSetMoveAbsParams, dest, chan, absolute_position)
}

pub fn mot_set_av_modes(dest: EndPoint, chan: u8, mode_bits: u16) -> Message {
    host_message(
        MessageId::MotSetAvModes,
        dest,
        Fields(smallvec![Value::U16(chan.into()), Value::U16(mode_bits)]),
    )
}

pub fn mot_set_trigger(dest: EndPoint, chan: u8, mode: u8) -> Message {
    chan_param(MessageId::MotSetTrigger, dest, chan, mode)
}

// ============================================================================
// 运动指令
// ============================================================================

pub fn mot_move_home(dest: EndPoint, chan: u8) -> Message {
    chan_only(MessageId::MotMoveHome, dest, chan)
}

pub fn mot_move_relative(dest: EndPoint, chan: u8, distance: i32) -> Message {
    chan_i32(MessageId::MotMoveRelative, dest, chan, distance)
}

pub fn mot_move_absolute(dest: EndPoint, chan: u8, position: i32) -> Message {
    chan_i32(MessageId::MotMoveAbsolute, dest, chan, position)
}

/// 以速度参数中的最大速度持续运动，直到收到停止指令
pub fn mot_move_velocity(dest: EndPoint, chan: u8, direction: Direction) -> Message {
    chan_param(MessageId::MotMoveVelocity, dest, chan, direction.into())
}

pub fn mot_move_jog(dest: EndPoint, chan: u8, direction: Direction) -> Message {
    chan_param(MessageId::MotMoveJog, dest, chan, direction.into())
}

pub fn mot_move_stop(dest: EndPoint, chan: u8, mode: StopMode) -> Message {
    chan_param(MessageId::MotMoveStop, dest, chan, mode.into())
}

pub fn mot_suspend_end_of_move_msgs(dest: EndPoint) -> Message {
    no_params(MessageId::MotSuspendEndOfMoveMsgs, dest)
}

pub fn mot_resume_end_of_move_msgs(dest: EndPoint) -> Message {
    no_params(MessageId::MotResumeEndOfMoveMsgs, dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;

    #[test]
    fn test_builders_match_layout() {
        let dest = EndPoint::Bay2;
        let all = [
            hw_disconnect(dest),
            hw_req_info(dest),
            hw_start_update_msgs(dest),
            hw_stop_update_msgs(dest),
            mod_identify(dest, 1),
            mod_set_chan_enable_state(dest, 1, EnableState::Enabled),
            mod_req_chan_enable_state(dest, 1),
            mot_req_status_update(dest, 1),
            mot_req_dc_status_update(dest, 1),
            mot_req_status_bits(dest, 1),
            mot_req_enc_counter(dest, 1),
            mot_req_pos_counter(dest, 1),
            mot_req_vel_params(dest, 1),
            mot_req_jog_params(dest, 1),
            mot_req_home_params(dest, 1),
            mot_req_trigger(dest, 1),
            mot_ack_dc_status_update(dest),
            mot_set_enc_counter(dest, 1, 5),
            mot_set_pos_counter(dest, 1, 5),
            mot_set_vel_params(dest, 1, &VelocityParams::default()),
            mot_set_jog_params(dest, 1, &JogParams::default()),
            mot_set_gen_move_params(dest, 1, 10),
            mot_set_home_params(dest, 1, &HomeParams::default()),
            mot_set_move_rel_params(dest, 1, 10),
            mot_set_move_abs_params(dest, 1, 10),
            mot_set_av_modes(dest, 1, led_mode::IDENT | led_mode::MOVING),
            mot_set_trigger(dest, 1, 0x21),
            mot_move_home(dest, 1),
            mot_move_relative(dest, 1, -10),
            mot_move_absolute(dest, 1, 10),
            mot_move_velocity(dest, 1, Direction::Forward),
            mot_move_jog(dest, 1, Direction::Reverse),
            mot_move_stop(dest, 1, StopMode::Immediate),
            mot_suspend_end_of_move_msgs(dest),
            mot_resume_end_of_move_msgs(dest),
        ];
        for msg in &all {
            msg.validate().unwrap_or_else(|e| panic!("{msg}: {e}"));
            assert_eq!(msg.source, EndPoint::Host);
            assert!(encode(msg).is_ok());
        }
    }

    #[test]
    fn test_mot_request_only_accepts_channel_queries() {
        assert!(mot_request(MessageId::MotReqHomeParams, EndPoint::Usb, 1).is_some());
        assert!(mot_request(MessageId::MotMoveStop, EndPoint::Usb, 1).is_none());
        assert!(mot_request(MessageId::MotGetVelParams, EndPoint::Usb, 1).is_none());
    }

    #[test]
    fn test_direction_inversion() {
        assert_eq!(Direction::Forward.inverted_if(true), Direction::Reverse);
        assert_eq!(Direction::Reverse.inverted_if(false), Direction::Reverse);
        assert_eq!(u8::from(Direction::Reverse), 2);
    }

    #[test]
    fn test_stop_wire_value() {
        let bytes = encode(&mot_move_stop(EndPoint::Usb, 1, StopMode::Profiled)).unwrap();
        assert_eq!(bytes, vec![0x65, 0x04, 0x01, 0x02, 0x50, 0x01]);
    }
}
