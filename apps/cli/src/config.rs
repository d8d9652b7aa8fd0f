//! CLI 配置文件
//!
//! 默认位置：`<config_dir>/apt/config.toml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use apt_sdk::MotionConfig;
use serde::{Deserialize, Serialize};

use crate::session::{ModelKind, seconds};

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 默认串口
    pub port: Option<String>,
    /// 自动查找时匹配的序列号前缀
    pub serial_prefix: Option<String>,
    /// 默认型号
    pub model: Option<ModelKind>,
    /// 移动超时（秒）
    pub move_timeout_secs: Option<f64>,
    /// 回零超时（秒）
    pub home_timeout_secs: Option<f64>,
}

impl CliConfig {
    pub fn default_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir().context("Cannot determine the configuration directory")?;
        path.push("apt");
        path.push("config.toml");
        Ok(path)
    }

    /// 读取配置；文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// 配置中的超时覆盖默认运动策略
    pub fn motion(&self) -> MotionConfig {
        let mut motion = MotionConfig::default();
        if let Some(timeout) = self.move_timeout_secs.and_then(seconds) {
            motion.move_timeout = timeout;
        }
        if let Some(timeout) = self.home_timeout_secs.and_then(seconds) {
            motion.home_timeout = timeout;
        }
        motion
    }
}
