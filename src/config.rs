//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__STORE__ENDPOINT=sqlite://data/hive.db`）。
//! 各段只负责承载原始值；「是否缺失」在会话启动时由 `require` / `target_url` 检查，缺失即 ConfigError。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub store: StoreSection,
    pub llm: LlmSection,
    pub safety: SafetySection,
    pub tools: ToolsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 每次调用模型时带入的最近消息条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_window: default_history_window(),
        }
    }
}

fn default_history_window() -> usize {
    20
}

/// [store] 段：会话上下文存储。endpoint / database / container 三者在启动会话时必需
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// `memory://` 或 `sqlite://<path>`
    pub endpoint: Option<String>,
    pub database: Option<String>,
    pub container: Option<String>,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            database: None,
            container: None,
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_store_timeout_secs() -> u64 {
    10
}

/// 校验后的存储连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreParams {
    pub endpoint: String,
    pub database: String,
    pub container: String,
    pub timeout: Duration,
}

impl StoreSection {
    /// 取出必需参数；任何一项缺失或为空返回 ConfigError
    pub fn require(&self) -> Result<StoreParams, AgentError> {
        Ok(StoreParams {
            endpoint: required("store.endpoint", &self.endpoint)?,
            database: required("store.database", &self.database)?,
            container: required("store.container", &self.container)?,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（OpenAI 兼容端点）；无 API Key 时回退 Mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [safety] 段：安全评估端点
///
/// 要么直接给出完整 `url`，要么给出 Azure 风格的 endpoint + deployment + api_version。
#[derive(Debug, Clone, Deserialize)]
pub struct SafetySection {
    pub url: Option<String>,
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    /// 以 `api-key` 请求头发送
    pub api_key: Option<String>,
    /// 以 `Authorization: Bearer` 发送
    pub bearer_token: Option<String>,
    #[serde(default = "default_safety_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_safety_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            url: None,
            endpoint: None,
            deployment: None,
            api_version: None,
            api_key: None,
            bearer_token: None,
            max_tokens: default_safety_max_tokens(),
            timeout_secs: default_safety_timeout_secs(),
        }
    }
}

fn default_safety_max_tokens() -> u32 {
    800
}

fn default_safety_timeout_secs() -> u64 {
    10
}

impl SafetySection {
    /// 计算评估请求 URL；`url` 优先，否则拼 Azure deployments 路径
    pub fn target_url(&self) -> Result<String, AgentError> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.trim().to_string());
        }
        let endpoint = required("safety.endpoint", &self.endpoint)?;
        let deployment = required("safety.deployment", &self.deployment)?;
        let api_version = required("safety.api_version", &self.api_version)?;
        Ok(format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        ))
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn required(key: &str, value: &Option<String>) -> Result<String, AgentError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| AgentError::ConfigError(format!("{key} is not set")))
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
