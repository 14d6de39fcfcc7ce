#[cfg(test)]
mod config_test;

use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_worker_num() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_connection_timeout_ms() -> u32 {
    30_000
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_to_stderr() -> bool {
    true
}

/// ICE candidate port range. `0..0` lets the kernel pick an ephemeral port.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IceConfig {
    #[serde(default)]
    pub min_port: u16,
    #[serde(default)]
    pub max_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub dir: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_to_stderr")]
    pub to_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: String::new(),
            name: String::new(),
            level: default_log_level(),
            to_stderr: default_log_to_stderr(),
        }
    }
}

/// Server configuration. Unknown keys are ignored so the same YAML file can
/// carry settings for the external signaling layer.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_worker_num")]
    pub worker_num: usize,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u32,
    #[serde(default)]
    pub ice: IceConfig,
    #[serde(default)]
    pub rtcp_report_timer_interval_ms: Option<u32>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            worker_num: default_worker_num(),
            host: default_host(),
            port: 0,
            connection_timeout_ms: default_connection_timeout_ms(),
            ice: IceConfig::default(),
            rtcp_report_timer_interval_ms: None,
            log: LogConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: ServerConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration errors fail at startup only.
    pub fn validate(&self) -> Result<()> {
        if self.worker_num == 0 {
            return Err(Error::ErrInvalidWorkerNum(self.worker_num));
        }
        let (min, max) = (self.ice.min_port, self.ice.max_port);
        if (min == 0) != (max == 0) || min > max {
            return Err(Error::ErrInvalidPortRange { min, max });
        }
        Ok(())
    }
}
