//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REEL__*` 覆盖（双下划线表示嵌套，如 `REEL__BACKEND__ENDPOINT=...`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub backend: BackendSection,
    pub session: SessionSection,
    pub invoker: InvokerSection,
    pub stream: StreamSection,
    pub pipeline: PipelineSection,
}

/// [app] 段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [backend] 段：工具后端地址、请求超时、可选的 Bearer token
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    pub endpoint: String,
    pub request_timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/mcp".to_string(),
            request_timeout_secs: 30,
            api_key: None,
        }
    }
}

/// [session] 段：心跳与自愈重连
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub heartbeat_interval_ms: u64,
    /// 不活跃阈值 = 心跳间隔 × 该倍数
    pub inactivity_multiplier: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub heartbeat_enabled: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            inactivity_multiplier: 4,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            heartbeat_enabled: true,
        }
    }
}

/// [invoker] 段：调用层固定间隔重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InvokerSection {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for InvokerSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1_500,
        }
    }
}

/// [stream] 段：流式轮询间隔、预算与错误退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    pub error_backoff_ms: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_polls: 30,
            error_backoff_ms: 2_000,
        }
    }
}

/// [pipeline] 段：素材生成参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// mp4 / webm
    pub output_format: String,
    /// 16:9 / 9:16 / 1:1 / 4:3
    pub aspect_ratio: String,
    /// v1 / v2 / v3
    pub product_shot_version: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            output_format: "mp4".to_string(),
            aspect_ratio: "16:9".to_string(),
            product_shot_version: "v2".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 REEL__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REEL__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REEL")
            .separator("__")
            .try_parsing(true),
    );

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// 拒绝会让重试、轮询或心跳失效的取值
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let endpoint = self.backend.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(invalid("backend.endpoint", "must be an http(s) URL"));
        }
        if self.backend.request_timeout_secs == 0 {
            return Err(invalid("backend.request_timeout_secs", "must be positive"));
        }
        if self.session.heartbeat_interval_ms == 0 {
            return Err(invalid("session.heartbeat_interval_ms", "must be positive"));
        }
        if self.session.reconnect_base_delay_ms > self.session.reconnect_max_delay_ms {
            return Err(invalid(
                "session.reconnect_base_delay_ms",
                "must not exceed reconnect_max_delay_ms",
            ));
        }
        if self.invoker.max_attempts == 0 {
            return Err(invalid("invoker.max_attempts", "must be at least 1"));
        }
        if self.stream.max_polls == 0 {
            return Err(invalid("stream.max_polls", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> config::ConfigError {
    config::ConfigError::Message(format!("invalid {key}: {reason}"))
}
