use anyhow::Error;
use config::Config;
use serde::{Deserialize, Serialize};
use std::env;

/// 读取配置源：`./config.*`、`./config.{env}.*` 与 `WIRING__*` 环境变量
///
/// `env` 取自 `CONFIG_ENV`，未设置时 debug 构建为 `dev`，release 构建为 `prod`。
pub fn load_config_sources() -> Result<Config, Error> {
    let env = env::var("CONFIG_ENV").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "dev".to_string()
        } else {
            "prod".to_string()
        }
    });
    Ok(Config::builder()
        .add_source(config::File::with_name("./config").required(false))
        .add_source(config::File::with_name(&format!("./config.{}", env)).required(false))
        .add_source(config::Environment::with_prefix("WIRING").separator("__"))
        .build()?)
}

/// 服务监听与停机相关的配置，位于配置源的 `server` 段
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    pub addr: String,
    pub port: u16,
    /// 收到停机信号后等待现有连接结束的最长时间
    pub shutdown_timeout_secs: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_secs: 30,
        }
    }
}

impl ApplicationConfig {
    pub fn load_() -> Result<Self, Error> {
        Self::from_config(&load_config_sources()?)
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        match config.get::<ApplicationConfig>("server") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => {
                tracing::warn!("no server section configured, using default server settings");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
