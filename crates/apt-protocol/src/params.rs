//! 运动参数块
//!
//! 同一组结构体既用于 `MOT_SET_*` 指令，也用于解析设备回传的 `MOT_GET_*`。
//! 数值均为设备单位（编码器计数或微步），换算由上层负责。

use crate::commands::{JogMode, StopMode};
use crate::ids::MessageId;
use crate::message::Message;

/// 速度参数（`MOT_*_VELPARAMS`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VelocityParams {
    pub min_velocity: i32,
    pub acceleration: i32,
    pub max_velocity: i32,
}

/// 点动参数（`MOT_*_JOGPARAMS`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JogParams {
    pub jog_mode: JogMode,
    pub step_size: i32,
    pub min_velocity: i32,
    pub acceleration: i32,
    pub max_velocity: i32,
    pub stop_mode: StopMode,
}

/// 回零参数（`MOT_*_HOMEPARAMS`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HomeParams {
    /// 1 = 正向，2 = 反向
    pub home_direction: u16,
    /// 1 = 硬件反向限位，4 = 硬件正向限位
    pub limit_switch: u16,
    pub home_velocity: i32,
    pub offset_distance: i32,
}

/// 设备回传的参数块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamsUpdate {
    Velocity(VelocityParams),
    Jog(JogParams),
    /// 反向间隙补偿距离
    GenMove { backlash_distance: i32 },
    Home(HomeParams),
    MoveRelative { relative_distance: i32 },
    MoveAbsolute { absolute_position: i32 },
    Trigger { mode: u8 },
    ChannelEnabled(bool),
}

impl ParamsUpdate {
    /// 从 `MOT_GET_*` / `MOD_GET_*` 消息中解析参数块
    ///
    /// 返回 `(chan_ident, 参数)`；其他消息返回 `None`。
    pub fn from_message(message: &Message) -> Option<(u16, ParamsUpdate)> {
        let chan = message.chan_ident()?;
        let i32_field = |name: &str| message.field_i64(name).and_then(|v| i32::try_from(v).ok());
        let u16_field = |name: &str| message.field_i64(name).and_then(|v| u16::try_from(v).ok());

        let update = match message.kind()? {
            MessageId::MotGetVelParams => ParamsUpdate::Velocity(VelocityParams {
                min_velocity: i32_field("min_velocity")?,
                acceleration: i32_field("acceleration")?,
                max_velocity: i32_field("max_velocity")?,
            }),
            MessageId::MotGetJogParams => ParamsUpdate::Jog(JogParams {
                jog_mode: JogMode::try_from(u16_field("jog_mode")?).unwrap_or_default(),
                step_size: i32_field("step_size")?,
                min_velocity: i32_field("min_velocity")?,
                acceleration: i32_field("acceleration")?,
                max_velocity: i32_field("max_velocity")?,
                stop_mode: u8::try_from(u16_field("stop_mode")?)
                    .ok()
                    .and_then(|v| StopMode::try_from(v).ok())
                    .unwrap_or_default(),
            }),
            MessageId::MotGetGenMoveParams => ParamsUpdate::GenMove {
                backlash_distance: i32_field("backlash_distance")?,
            },
            MessageId::MotGetHomeParams => ParamsUpdate::Home(HomeParams {
                home_direction: u16_field("home_direction")?,
                limit_switch: u16_field("limit_switch")?,
                home_velocity: i32_field("home_velocity")?,
                offset_distance: i32_field("offset_distance")?,
            }),
            MessageId::MotGetMoveRelParams => ParamsUpdate::MoveRelative {
                relative_distance: i32_field("relative_distance")?,
            },
            MessageId::MotGetMoveAbsParams => ParamsUpdate::MoveAbsolute {
                absolute_position: i32_field("absolute_position")?,
            },
            MessageId::MotGetTrigger => ParamsUpdate::Trigger {
                mode: u8::try_from(message.field_i64("mode")?).ok()?,
            },
            MessageId::ModGetChanEnableState => ParamsUpdate::ChannelEnabled(message.field_i64("enable_state")? == 1),
            _ => return None,
        };
        Some((chan, update))
    }
}
