//! 电机状态位
//!
//! 状态类消息（`MOT_GET_STATUSUPDATE`、`MOT_GET_DCSTATUSUPDATE`、
//! `MOT_MOVE_COMPLETED` 等）都携带一个 32 位状态字。
//!
//! 位定义（LSB first，与 bilge 默认位序一致）：
//! - Bit 0/1: 正向/反向硬件限位
//! - Bit 4/5: 正向/反向运动中
//! - Bit 6/7: 正向/反向点动中
//! - Bit 8: 电机已连接
//! - Bit 9: 回零中
//! - Bit 10: 已回零
//! - Bit 12: 位置跟踪
//! - Bit 13: 已稳定
//! - Bit 14: 运动错误（超差）
//! - Bit 17: 互锁
//! - Bit 24: 电机电流限制
//! - Bit 31: 通道已使能

use bilge::prelude::*;

#[bitsize(32)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusBits {
    pub forward_limit: bool,   // Bit 0
    pub reverse_limit: bool,   // Bit 1
    reserved_2: u2,            // Bit 2-3
    pub moving_forward: bool,  // Bit 4
    pub moving_reverse: bool,  // Bit 5
    pub jogging_forward: bool, // Bit 6
    pub jogging_reverse: bool, // Bit 7
    pub motor_connected: bool, // Bit 8
    pub homing: bool,          // Bit 9
    pub homed: bool,           // Bit 10
    reserved_11: u1,           // Bit 11
    pub tracking: bool,        // Bit 12
    pub settled: bool,         // Bit 13
    pub motion_error: bool,    // Bit 14
    reserved_15: u2,           // Bit 15-16
    pub interlock: bool,       // Bit 17
    reserved_18: u6,           // Bit 18-23
    pub current_limit: bool,   // Bit 24
    reserved_25: u6,           // Bit 25-30
    pub channel_enabled: bool, // Bit 31
}

impl StatusBits {
    /// 从原始状态字构造
    pub fn from_raw(raw: u32) -> Self {
        StatusBits::from(u32::new(raw))
    }

    /// 原始状态字
    pub fn raw(self) -> u32 {
        u32::from(self).value()
    }

    /// 任意方向的运动或点动
    pub fn is_moving(self) -> bool {
        self.moving_forward() || self.moving_reverse() || self.jogging_forward() || self.jogging_reverse()
    }

    /// 交换正反向限位（部分机型接线与手册相反）
    pub fn with_limits_swapped(mut self) -> Self {
        let forward = self.forward_limit();
        let reverse = self.reverse_limit();
        self.set_forward_limit(reverse);
        self.set_reverse_limit(forward);
        self
    }
}

/// 供显示用的状态摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusFlags {
    pub forward_limit: bool,
    pub reverse_limit: bool,
    pub moving_forward: bool,
    pub moving_reverse: bool,
    pub jogging_forward: bool,
    pub jogging_reverse: bool,
    pub motor_connected: bool,
    pub homing: bool,
    pub homed: bool,
    pub tracking: bool,
    pub settled: bool,
    pub motion_error: bool,
    pub interlock: bool,
    pub current_limit: bool,
    pub channel_enabled: bool,
}

impl From<StatusBits> for StatusFlags {
    fn from(bits: StatusBits) -> Self {
        Self {
            forward_limit: bits.forward_limit(),
            reverse_limit: bits.reverse_limit(),
            moving_forward: bits.moving_forward(),
            moving_reverse: bits.moving_reverse(),
            jogging_forward: bits.jogging_forward(),
            jogging_reverse: bits.jogging_reverse(),
            motor_connected: bits.motor_connected(),
            homing: bits.homing(),
            homed: bits.homed(),
            tracking: bits.tracking(),
            settled: bits.settled(),
            motion_error: bits.motion_error(),
            interlock: bits.interlock(),
            current_limit: bits.current_limit(),
            channel_enabled: bits.channel_enabled(),
        }
    }
}
