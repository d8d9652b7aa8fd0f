//! # APT CLI
//!
//! Thorlabs APT 运动控制器的命令行工具。
//!
//! 每条命令独立执行：连接 -> 操作 -> 断开。
//!
//! ```bash
//! # 配置默认型号与序列号前缀
//! apt-cli config set --model bbd202 --serial-prefix 73
//!
//! # 回零后移动 bay 1
//! apt-cli home --bay 1
//! apt-cli move --absolute 20000 --bay 1
//!
//! # 监视状态
//! apt-cli monitor --interval-ms 200
//! ```
//!
//! 日志级别由 `RUST_LOG` 控制。

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;
mod session;

use commands::{
    ConfigCommand, HomeCommand, IdentifyCommand, InfoCommand, ListCommand, MonitorCommand, MoveCommand, SendCommand,
    StatusCommand, StopCommand,
};
use config::CliConfig;
use session::{ConnectArgs, Session};

/// APT CLI - 运动控制器命令行工具
#[derive(Parser, Debug)]
#[command(name = "apt-cli")]
#[command(about = "Command-line interface for Thorlabs APT motion controllers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 列出可用的控制器串口
    List(ListCommand),

    /// 让控制器指示灯闪烁
    Identify(IdentifyCommand),

    /// 回零
    Home(HomeCommand),

    /// 移动到绝对位置或移动相对距离
    Move(MoveCommand),

    /// 停止运动
    Stop(StopCommand),

    /// 打印最新状态
    Status(StatusCommand),

    /// 打印硬件信息
    Info(InfoCommand),

    /// 持续监视状态
    Monitor(MonitorCommand),

    /// 发送原始帧
    Send(SendCommand),
}

fn main() -> Result<()> {
    apt_sdk::init_logging();

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => CliConfig::default_path()?,
    };

    let command = match cli.command {
        Commands::Config(cmd) => return cmd.execute(&path),
        command => command,
    };

    let config = CliConfig::load(&path)?;
    if let Commands::List(cmd) = &command {
        let prefix = cli.connect.serial_prefix.as_deref().or(config.serial_prefix.as_deref());
        return cmd.execute(prefix);
    }

    let session = Session::new(&cli.connect, &config);
    match command {
        Commands::Identify(cmd) => session.run(cmd),
        Commands::Home(cmd) => session.run(cmd),
        Commands::Move(cmd) => session.run(cmd),
        Commands::Stop(cmd) => session.run(cmd),
        Commands::Status(cmd) => session.run(cmd),
        Commands::Info(cmd) => session.run(cmd),
        Commands::Monitor(cmd) => session.run(cmd),
        Commands::Send(cmd) => session.run(cmd),
        Commands::Config(_) | Commands::List(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move() {
        let cli = Cli::try_parse_from(["apt-cli", "-m", "bbd202", "move", "--relative", "-500", "--bay", "1"]).unwrap();
        assert_eq!(cli.connect.model, Some(session::ModelKind::Bbd202));
        let Commands::Move(cmd) = cli.command else {
            panic!("expected move");
        };
        assert_eq!(cmd.relative, Some(-500));
        assert_eq!(cmd.target.bay, 1);
    }

    #[test]
    fn test_move_requires_destination() {
        assert!(Cli::try_parse_from(["apt-cli", "move"]).is_err());
        assert!(Cli::try_parse_from(["apt-cli", "move", "--absolute", "1", "--relative", "2"]).is_err());
    }
}
