//! 配置管理命令

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use crate::config::CliConfig;
use crate::session::{ModelKind, seconds};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前配置
    Show,

    /// 设置配置项
    Set {
        /// 默认串口
        #[arg(long)]
        port: Option<String>,

        /// 序列号前缀
        #[arg(long)]
        serial_prefix: Option<String>,

        /// 默认型号
        #[arg(long, value_enum)]
        model: Option<ModelKind>,

        /// 移动超时（秒）
        #[arg(long)]
        move_timeout: Option<f64>,

        /// 回零超时（秒）
        #[arg(long)]
        home_timeout: Option<f64>,
    },

    /// 打印配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = CliConfig::load(path)?;
                print!("{}", toml::to_string_pretty(&config)?);
            },
            ConfigCommand::Set {
                port,
                serial_prefix,
                model,
                move_timeout,
                home_timeout,
            } => {
                let mut config = CliConfig::load(path)?;
                for timeout in [move_timeout, home_timeout].into_iter().flatten() {
                    if seconds(timeout).is_none() {
                        anyhow::bail!("Invalid timeout: {timeout}");
                    }
                }
                config.port = port.or(config.port);
                config.serial_prefix = serial_prefix.or(config.serial_prefix);
                config.model = model.or(config.model);
                config.move_timeout_secs = move_timeout.or(config.move_timeout_secs);
                config.home_timeout_secs = home_timeout.or(config.home_timeout_secs);
                config.save(path)?;
                println!("✅ Saved {}", path.display());
            },
            ConfigCommand::Path => println!("{}", path.display()),
        }
        Ok(())
    }
}
