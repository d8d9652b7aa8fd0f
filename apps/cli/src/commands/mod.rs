//! 命令定义和实现

pub mod config;
pub mod list;
pub mod motion;
pub mod send;
pub mod status;

pub use config::ConfigCommand;
pub use list::ListCommand;
pub use motion::{HomeCommand, IdentifyCommand, MoveCommand, StopCommand};
pub use send::SendCommand;
pub use status::{InfoCommand, MonitorCommand, StatusCommand};
