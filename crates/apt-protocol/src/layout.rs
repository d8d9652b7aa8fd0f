//! 消息布局表
//!
//! 每个已知 ID 对应一条 [`MessageLayout`]：帧形式（短帧/长帧）以及字段列表。
//! 编解码器完全由此表驱动，新增消息只需要在 [`LAYOUTS`] 中加一行。
//!
//! 短帧的字段只能是 `U8`，最多两个，依次占用头部的 `param1`/`param2`；
//! 长帧的字段按顺序紧密排列在消息体中，小端字节序。

use crate::ids::MessageId;

/// 字段类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    I16,
    U32,
    I32,
    /// 定长文本，不足部分以 NUL 填充
    Text(usize),
    /// 定长原始字节
    Bytes(usize),
}

impl FieldKind {
    /// 在线上占用的字节数
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::Text(n) | FieldKind::Bytes(n) => n,
        }
    }
}

/// 字段描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// 帧形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    /// 仅 6 字节头部
    Short,
    /// 头部 + 消息体
    Long,
}

/// 单个消息 ID 的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageLayout {
    pub id: MessageId,
    /// 协议手册中的名称，例如 `MOT_MOVE_HOME`
    pub name: &'static str,
    pub form: Form,
    pub fields: &'static [FieldSpec],
}

impl MessageLayout {
    const fn short(id: MessageId, name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { id, name, form: Form::Short, fields }
    }

    const fn long(id: MessageId, name: &'static str, fields: &'static [FieldSpec]) -> Self {
        Self { id, name, form: Form::Long, fields }
    }

    /// 长帧消息体长度；短帧为 0
    pub fn body_len(&self) -> usize {
        match self.form {
            Form::Short => 0,
            Form::Long => self.fields.iter().map(|f| f.kind.width()).sum(),
        }
    }

    /// 字段在列表中的位置
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn is_long(&self) -> bool {
        self.form == Form::Long
    }
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

// 短帧参数
const P_CHAN: FieldSpec = field("chan_ident", FieldKind::U8);
const P_ENABLE: FieldSpec = field("enable_state", FieldKind::U8);
const P_DIRECTION: FieldSpec = field("direction", FieldKind::U8);
const P_STOP_MODE: FieldSpec = field("stop_mode", FieldKind::U8);
const P_TRIGGER_MODE: FieldSpec = field("mode", FieldKind::U8);

const NO_PARAMS: &[FieldSpec] = &[];
const SHORT_CHAN: &[FieldSpec] = &[P_CHAN];
const SHORT_ENABLE: &[FieldSpec] = &[P_CHAN, P_ENABLE];
const SHORT_DIRECTION: &[FieldSpec] = &[P_CHAN, P_DIRECTION];
const SHORT_STOP: &[FieldSpec] = &[P_CHAN, P_STOP_MODE];
const SHORT_TRIGGER: &[FieldSpec] = &[P_CHAN, P_TRIGGER_MODE];

// 长帧字段
const CHAN: FieldSpec = field("chan_ident", FieldKind::U16);

const HW_INFO: &[FieldSpec] = &[
    field("serial_number", FieldKind::U32),
    field("model_number", FieldKind::Text(8)),
    field("hw_type", FieldKind::U16),
    // [minor, interim, major, unused]
    field("firmware_version", FieldKind::Bytes(4)),
    field("notes", FieldKind::Text(48)),
    field("empty_space", FieldKind::Bytes(12)),
    field("hw_version", FieldKind::U16),
    field("mod_state", FieldKind::U16),
    field("nchs", FieldKind::U16),
];

const RICH_RESPONSE: &[FieldSpec] = &[
    field("msgid", FieldKind::U16),
    field("code", FieldKind::U16),
    field("notes", FieldKind::Text(64)),
];

const VEL_PARAMS: &[FieldSpec] = &[
    CHAN,
    field("min_velocity", FieldKind::I32),
    field("acceleration", FieldKind::I32),
    field("max_velocity", FieldKind::I32),
];

const JOG_PARAMS: &[FieldSpec] = &[
    CHAN,
    field("jog_mode", FieldKind::U16),
    field("step_size", FieldKind::I32),
    field("min_velocity", FieldKind::I32),
    field("acceleration", FieldKind::I32),
    field("max_velocity", FieldKind::I32),
    field("stop_mode", FieldKind::U16),
];

const GEN_MOVE_PARAMS: &[FieldSpec] = &[CHAN, field("backlash_distance", FieldKind::I32)];

const HOME_PARAMS: &[FieldSpec] = &[
    CHAN,
    field("home_direction", FieldKind::U16),
    field("limit_switch", FieldKind::U16),
    field("home_velocity", FieldKind::I32),
    field("offset_distance", FieldKind::I32),
];

const MOVE_REL_PARAMS: &[FieldSpec] = &[CHAN, field("relative_distance", FieldKind::I32)];
const MOVE_ABS_PARAMS: &[FieldSpec] = &[CHAN, field("absolute_position", FieldKind::I32)];
const MOVE_RELATIVE: &[FieldSpec] = &[CHAN, field("distance", FieldKind::I32)];
/// 位置计数器，同时用作绝对移动的消息体
const POS_COUNTER: &[FieldSpec] = &[CHAN, field("position", FieldKind::I32)];
const ENC_COUNTER: &[FieldSpec] = &[CHAN, field("encoder_count", FieldKind::I32)];
const STATUS_BITS: &[FieldSpec] = &[CHAN, field("status_bits", FieldKind::U32)];
const AV_MODES: &[FieldSpec] = &[CHAN, field("mode_bits", FieldKind::U16)];

/// DC 伺服状态块，同时用于运动完成/停止通知
const DC_STATUS: &[FieldSpec] = &[
    CHAN,
    field("position", FieldKind::I32),
    field("velocity", FieldKind::I16),
    field("reserved", FieldKind::U16),
    field("status_bits", FieldKind::U32),
];

/// 步进电机状态块
const STATUS_UPDATE: &[FieldSpec] = &[
    CHAN,
    field("position", FieldKind::I32),
    field("encoder_count", FieldKind::I32),
    field("status_bits", FieldKind::U32),
];

/// 布局表，按 ID 升序排列（查找使用二分）
pub static LAYOUTS: &[MessageLayout] = &[
    MessageLayout::short(MessageId::HwDisconnect, "HW_DISCONNECT", NO_PARAMS),
    MessageLayout::short(MessageId::HwReqInfo, "HW_REQ_INFO", NO_PARAMS),
    MessageLayout::long(MessageId::HwGetInfo, "HW_GET_INFO", HW_INFO),
    MessageLayout::short(MessageId::HwStartUpdateMsgs, "HW_START_UPDATEMSGS", NO_PARAMS),
    MessageLayout::short(MessageId::HwStopUpdateMsgs, "HW_STOP_UPDATEMSGS", NO_PARAMS),
    MessageLayout::short(MessageId::HwResponse, "HW_RESPONSE", NO_PARAMS),
    MessageLayout::long(MessageId::HwRichResponse, "HW_RICHRESPONSE", RICH_RESPONSE),
    MessageLayout::short(MessageId::ModSetChanEnableState, "MOD_SET_CHANENABLESTATE", SHORT_ENABLE),
    MessageLayout::short(MessageId::ModReqChanEnableState, "MOD_REQ_CHANENABLESTATE", SHORT_CHAN),
    MessageLayout::short(MessageId::ModGetChanEnableState, "MOD_GET_CHANENABLESTATE", SHORT_ENABLE),
    MessageLayout::short(MessageId::ModIdentify, "MOD_IDENTIFY", SHORT_CHAN),
    MessageLayout::long(MessageId::MotSetEncCounter, "MOT_SET_ENCCOUNTER", ENC_COUNTER),
    MessageLayout::short(MessageId::MotReqEncCounter, "MOT_REQ_ENCCOUNTER", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetEncCounter, "MOT_GET_ENCCOUNTER", ENC_COUNTER),
    MessageLayout::long(MessageId::MotSetPosCounter, "MOT_SET_POSCOUNTER", POS_COUNTER),
    MessageLayout::short(MessageId::MotReqPosCounter, "MOT_REQ_POSCOUNTER", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetPosCounter, "MOT_GET_POSCOUNTER", POS_COUNTER),
    MessageLayout::long(MessageId::MotSetVelParams, "MOT_SET_VELPARAMS", VEL_PARAMS),
    MessageLayout::short(MessageId::MotReqVelParams, "MOT_REQ_VELPARAMS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetVelParams, "MOT_GET_VELPARAMS", VEL_PARAMS),
    MessageLayout::long(MessageId::MotSetJogParams, "MOT_SET_JOGPARAMS", JOG_PARAMS),
    MessageLayout::short(MessageId::MotReqJogParams, "MOT_REQ_JOGPARAMS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetJogParams, "MOT_GET_JOGPARAMS", JOG_PARAMS),
    MessageLayout::short(MessageId::MotReqStatusBits, "MOT_REQ_STATUSBITS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetStatusBits, "MOT_GET_STATUSBITS", STATUS_BITS),
    MessageLayout::long(MessageId::MotSetGenMoveParams, "MOT_SET_GENMOVEPARAMS", GEN_MOVE_PARAMS),
    MessageLayout::short(MessageId::MotReqGenMoveParams, "MOT_REQ_GENMOVEPARAMS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetGenMoveParams, "MOT_GET_GENMOVEPARAMS", GEN_MOVE_PARAMS),
    MessageLayout::long(MessageId::MotSetHomeParams, "MOT_SET_HOMEPARAMS", HOME_PARAMS),
    MessageLayout::short(MessageId::MotReqHomeParams, "MOT_REQ_HOMEPARAMS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetHomeParams, "MOT_GET_HOMEPARAMS", HOME_PARAMS),
    MessageLayout::short(MessageId::MotMoveHome, "MOT_MOVE_HOME", SHORT_CHAN),
    MessageLayout::short(MessageId::MotMoveHomed, "MOT_MOVE_HOMED", SHORT_CHAN),
    MessageLayout::long(MessageId::MotSetMoveRelParams, "MOT_SET_MOVERELPARAMS", MOVE_REL_PARAMS),
    MessageLayout::short(MessageId::MotReqMoveRelParams, "MOT_REQ_MOVERELPARAMS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetMoveRelParams, "MOT_GET_MOVERELPARAMS", MOVE_REL_PARAMS),
    MessageLayout::long(MessageId::MotMoveRelative, "MOT_MOVE_RELATIVE", MOVE_RELATIVE),
    MessageLayout::long(MessageId::MotSetMoveAbsParams, "MOT_SET_MOVEABSPARAMS", MOVE_ABS_PARAMS),
    MessageLayout::short(MessageId::MotReqMoveAbsParams, "MOT_REQ_MOVEABSPARAMS", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetMoveAbsParams, "MOT_GET_MOVEABSPARAMS", MOVE_ABS_PARAMS),
    MessageLayout::long(MessageId::MotMoveAbsolute, "MOT_MOVE_ABSOLUTE", POS_COUNTER),
    MessageLayout::short(MessageId::MotMoveVelocity, "MOT_MOVE_VELOCITY", SHORT_DIRECTION),
    MessageLayout::long(MessageId::MotMoveCompleted, "MOT_MOVE_COMPLETED", DC_STATUS),
    MessageLayout::short(MessageId::MotMoveStop, "MOT_MOVE_STOP", SHORT_STOP),
    MessageLayout::long(MessageId::MotMoveStopped, "MOT_MOVE_STOPPED", DC_STATUS),
    MessageLayout::short(MessageId::MotMoveJog, "MOT_MOVE_JOG", SHORT_DIRECTION),
    MessageLayout::short(MessageId::MotSuspendEndOfMoveMsgs, "MOT_SUSPEND_ENDOFMOVEMSGS", NO_PARAMS),
    MessageLayout::short(MessageId::MotResumeEndOfMoveMsgs, "MOT_RESUME_ENDOFMOVEMSGS", NO_PARAMS),
    MessageLayout::short(MessageId::MotReqStatusUpdate, "MOT_REQ_STATUSUPDATE", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetStatusUpdate, "MOT_GET_STATUSUPDATE", STATUS_UPDATE),
    MessageLayout::short(MessageId::MotReqDcStatusUpdate, "MOT_REQ_DCSTATUSUPDATE", SHORT_CHAN),
    MessageLayout::long(MessageId::MotGetDcStatusUpdate, "MOT_GET_DCSTATUSUPDATE", DC_STATUS),
    MessageLayout::short(MessageId::MotAckDcStatusUpdate, "MOT_ACK_DCSTATUSUPDATE", NO_PARAMS),
    MessageLayout::long(MessageId::MotSetAvModes, "MOT_SET_AVMODES", AV_MODES),
    MessageLayout::short(MessageId::MotSetTrigger, "MOT_SET_TRIGGER", SHORT_TRIGGER),
    MessageLayout::short(MessageId::MotReqTrigger, "MOT_REQ_TRIGGER", SHORT_CHAN),
    MessageLayout::short(MessageId::MotGetTrigger, "MOT_GET_TRIGGER", SHORT_TRIGGER),
];

/// 按原始 ID 查找布局
pub fn layout(id: u16) -> Option<&'static MessageLayout> {
    LAYOUTS
        .binary_search_by_key(&id, |l| l.id.raw())
        .ok()
        .map(|i| &LAYOUTS[i])
}

impl MessageId {
    /// 该 ID 的布局表项
    pub fn layout(self) -> Option<&'static MessageLayout> {
        layout(self.raw())
    }
}
