//! 控制器型号
//!
//! 每个型号是一个零大小类型，通过 [`Model`] 的关联常量提供寻址和默认选项；
//! 能力标记 trait 决定 [`MotorController`](crate::MotorController) 上可用的操作。
//! 对不具备某项能力的型号调用对应方法在编译期即被拒绝：
//!
//! ```compile_fail
//! use apt_device::{MotorController, Motor, models::GenericController};
//!
//! fn home(device: &MotorController<GenericController>) {
//!     device.home(0, 0).unwrap(); // GenericController 不是 MotorModel
//! }
//! ```

use apt_protocol::EndPoint;

/// 型号常量
pub trait Model: Send + Sync + 'static {
    /// 型号名（日志与 CLI 显示）
    const NAME: &'static str;
    /// 控制器本体的端点
    const CONTROLLER: EndPoint;
    /// 受控 bay 端点，按 bay 序号排列
    const BAYS: &'static [EndPoint];
    /// 每个 bay 内的 `chan_ident`
    const CHANNELS: &'static [u16] = &[1];
    /// 自动查找时匹配的序列号前缀
    const SERIAL_PREFIX: Option<&'static str> = None;
    const INVERT_DIRECTION: bool = false;
    const SWAP_LIMITS: bool = false;
}

/// 支持运动指令
pub trait MotorModel: Model {}

/// 带编码器计数器
pub trait EncoderModel: MotorModel {}

/// 支持触发输入/输出配置
pub trait TriggerModel: MotorModel {}

/// 只有一个 bay、一个通道
pub trait SingleChannelModel: Model {}

/// 机架式，多个 bay
pub trait MultiBayModel: Model {}

/// 任意 APT 控制器（仅基础能力）
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericController;

impl Model for GenericController {
    const NAME: &'static str = "APT";
    const CONTROLLER: EndPoint = EndPoint::Usb;
    const BAYS: &'static [EndPoint] = &[EndPoint::Usb];
}

impl SingleChannelModel for GenericController {}

macro_rules! rack_model {
    ($(#[$doc:meta])* $name:ident, $label:literal, $prefix:literal, [$($bay:ident),+] $(, $cap:ident)*) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Model for $name {
            const NAME: &'static str = $label;
            const CONTROLLER: EndPoint = EndPoint::Rack;
            const BAYS: &'static [EndPoint] = &[$(EndPoint::$bay),+];
            const SERIAL_PREFIX: Option<&'static str> = Some($prefix);
            const SWAP_LIMITS: bool = true;
        }

        impl MotorModel for $name {}
        impl MultiBayModel for $name {}
        $(impl $cap for $name {})*
    };
}

rack_model!(
    /// BBD201 单轴无刷直流伺服控制器
    Bbd201, "BBD201", "73", [Bay0], EncoderModel, TriggerModel, SingleChannelModel
);
rack_model!(
    /// BBD202 双轴无刷直流伺服控制器
    Bbd202, "BBD202", "73", [Bay0, Bay1], EncoderModel, TriggerModel
);
rack_model!(
    /// BBD203 三轴无刷直流伺服控制器
    Bbd203, "BBD203", "73", [Bay0, Bay1, Bay2], EncoderModel, TriggerModel
);
rack_model!(
    /// BSC201 单轴步进电机控制器
    Bsc201, "BSC201", "40", [Bay0], TriggerModel, SingleChannelModel
);
rack_model!(
    /// BSC202 双轴步进电机控制器
    Bsc202, "BSC202", "40", [Bay0, Bay1], TriggerModel
);
rack_model!(
    /// BSC203 三轴步进电机控制器
    Bsc203, "BSC203", "40", [Bay0, Bay1, Bay2], TriggerModel
);

/// TDC001 T-Cube 直流伺服控制器
///
/// 方向指令与限位开关都与手册相反。
#[derive(Debug, Clone, Copy, Default)]
pub struct Tdc001;

impl Model for Tdc001 {
    const NAME: &'static str = "TDC001";
    const CONTROLLER: EndPoint = EndPoint::Usb;
    const BAYS: &'static [EndPoint] = &[EndPoint::Usb];
    const SERIAL_PREFIX: Option<&'static str> = Some("83");
    const INVERT_DIRECTION: bool = true;
    const SWAP_LIMITS: bool = true;
}

impl MotorModel for Tdc001 {}
impl SingleChannelModel for Tdc001 {}

/// KDC101 K-Cube 直流伺服控制器
#[derive(Debug, Clone, Copy, Default)]
pub struct Kdc101;

impl Model for Kdc101 {
    const NAME: &'static str = "KDC101";
    const CONTROLLER: EndPoint = EndPoint::Usb;
    const BAYS: &'static [EndPoint] = &[EndPoint::Usb];
    const SERIAL_PREFIX: Option<&'static str> = Some("27");
    const INVERT_DIRECTION: bool = true;
    const SWAP_LIMITS: bool = true;
}

impl MotorModel for Kdc101 {}
impl TriggerModel for Kdc101 {}
impl SingleChannelModel for Kdc101 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rack_models() {
        assert_eq!(Bbd203::BAYS, &[EndPoint::Bay0, EndPoint::Bay1, EndPoint::Bay2]);
        assert_eq!(Bbd203::CONTROLLER, EndPoint::Rack);
        assert_eq!(Bsc201::SERIAL_PREFIX, Some("40"));
        assert_eq!(Bbd201::CHANNELS, &[1]);
        assert!(Bsc202::SWAP_LIMITS);
        assert!(!Bsc202::INVERT_DIRECTION);
    }

    #[test]
    fn test_usb_models() {
        assert_eq!(Kdc101::BAYS, &[EndPoint::Usb]);
        assert!(Kdc101::INVERT_DIRECTION && Kdc101::SWAP_LIMITS);
        assert_eq!(Tdc001::SERIAL_PREFIX, Some("83"));
        assert_eq!(GenericController::SERIAL_PREFIX, None);
    }
}
