//! APT 消息 ID 定义
//!
//! 只列出本库有布局表项的消息。不在此枚举中的 ID 仍可收发，
//! 解码后作为原始消息透传。

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 已知消息 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum MessageId {
    // 通用（HW_ / MOD_）
    HwDisconnect = 0x0002,
    HwReqInfo = 0x0005,
    HwGetInfo = 0x0006,
    HwStartUpdateMsgs = 0x0011,
    HwStopUpdateMsgs = 0x0012,
    HwResponse = 0x0080,
    HwRichResponse = 0x0081,
    ModSetChanEnableState = 0x0210,
    ModReqChanEnableState = 0x0211,
    ModGetChanEnableState = 0x0212,
    ModIdentify = 0x0223,

    // 电机（MOT_）
    MotSetEncCounter = 0x0409,
    MotReqEncCounter = 0x040A,
    MotGetEncCounter = 0x040B,
    MotSetPosCounter = 0x0410,
    MotReqPosCounter = 0x0411,
    MotGetPosCounter = 0x0412,
    MotSetVelParams = 0x0413,
    MotReqVelParams = 0x0414,
    MotGetVelParams = 0x0415,
    MotSetJogParams = 0x0416,
    MotReqJogParams = 0x0417,
    MotGetJogParams = 0x0418,
    MotReqStatusBits = 0x0429,
    MotGetStatusBits = 0x042A,
    MotSetGenMoveParams = 0x043A,
    MotReqGenMoveParams = 0x043B,
    MotGetGenMoveParams = 0x043C,
    MotSetHomeParams = 0x0440,
    MotReqHomeParams = 0x0441,
    MotGetHomeParams = 0x0442,
    MotMoveHome = 0x0443,
    MotMoveHomed = 0x0444,
    MotSetMoveRelParams = 0x0445,
    MotReqMoveRelParams = 0x0446,
    MotGetMoveRelParams = 0x0447,
    MotMoveRelative = 0x0448,
    MotSetMoveAbsParams = 0x0450,
    MotReqMoveAbsParams = 0x0451,
    MotGetMoveAbsParams = 0x0452,
    MotMoveAbsolute = 0x0453,
    MotMoveVelocity = 0x0457,
    MotMoveCompleted = 0x0464,
    MotMoveStop = 0x0465,
    MotMoveStopped = 0x0466,
    MotMoveJog = 0x046A,
    MotSuspendEndOfMoveMsgs = 0x046B,
    MotResumeEndOfMoveMsgs = 0x046C,
    MotReqStatusUpdate = 0x0480,
    MotGetStatusUpdate = 0x0481,
    MotReqDcStatusUpdate = 0x0490,
    MotGetDcStatusUpdate = 0x0491,
    MotAckDcStatusUpdate = 0x0492,
    MotSetAvModes = 0x04B3,
    MotSetTrigger = 0x0500,
    MotReqTrigger = 0x0501,
    MotGetTrigger = 0x0502,
}

impl MessageId {
    /// 原始 16 位 ID
    pub fn raw(self) -> u16 {
        self.into()
    }

    /// 该消息是否携带运动状态（位置/速度/状态位）
    pub fn is_status(self) -> bool {
        matches!(
            self,
            MessageId::MotGetStatusUpdate
                | MessageId::MotGetDcStatusUpdate
                | MessageId::MotMoveCompleted
                | MessageId::MotMoveStopped
                | MessageId::MotGetStatusBits
                | MessageId::MotGetPosCounter
                | MessageId::MotGetEncCounter
        )
    }

    /// 设备上报的错误消息
    pub fn is_error_report(self) -> bool {
        matches!(self, MessageId::HwResponse | MessageId::HwRichResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        assert_eq!(MessageId::MotMoveHome.raw(), 0x0443);
        assert_eq!(MessageId::try_from(0x0464u16).ok(), Some(MessageId::MotMoveCompleted));
        assert!(MessageId::try_from(0x7777u16).is_err());
    }

    #[test]
    fn test_classification() {
        assert!(MessageId::MotGetDcStatusUpdate.is_status());
        assert!(!MessageId::MotMoveHome.is_status());
        assert!(MessageId::HwRichResponse.is_error_report());
    }
}
