use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RolePlayError;

pub const DEFAULT_MODEL: &str = "qwen3:4b-instruct-2507-q4_K_M";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Agent 配置（模型与采样参数），构造 Agent 后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_llm_retries: usize,
    pub max_function_rounds: usize,
    /// 发送给模型的最近记忆条数，None 表示全部
    pub message_window: Option<usize>,
    /// 出现即视为该 Agent 主动终止的标记
    pub termination_markers: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            max_llm_retries: 3,
            max_function_rounds: 5,
            message_window: None,
            termination_markers: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_termination_marker(mut self, marker: impl Into<String>) -> Self {
        self.termination_markers.push(marker.into());
        self
    }

    pub fn validate(&self) -> Result<(), RolePlayError> {
        if self.model.trim().is_empty() {
            return Err(RolePlayError::Configuration("模型名称不能为空".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RolePlayError::Configuration(format!(
                "temperature 必须在 0 到 2 之间：{}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(RolePlayError::Configuration("max_tokens 必须大于 0".into()));
        }
        if self.max_llm_retries == 0 {
            return Err(RolePlayError::Configuration("max_llm_retries 必须大于 0".into()));
        }
        if self.message_window == Some(0) {
            return Err(RolePlayError::Configuration("message_window 必须大于 0".into()));
        }
        Ok(())
    }
}

/// 角色扮演会话配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub assistant_role_name: String,
    pub user_role_name: String,
    pub task_prompt: String,
    pub chat_turn_limit: usize,
    pub with_task_specify: bool,
    pub word_limit: usize,
    pub output_language: Option<String>,
    /// 是否允许双方调用 role_playing_function
    pub with_functions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            assistant_role_name: "Python Programmer".to_string(),
            user_role_name: "Stock Trader".to_string(),
            task_prompt: String::new(),
            chat_turn_limit: 50,
            with_task_specify: false,
            word_limit: 50,
            output_language: None,
            with_functions: false,
        }
    }
}

impl SessionConfig {
    pub fn new(
        assistant_role_name: impl Into<String>,
        user_role_name: impl Into<String>,
        task_prompt: impl Into<String>,
    ) -> Self {
        SessionConfig {
            assistant_role_name: assistant_role_name.into(),
            user_role_name: user_role_name.into(),
            task_prompt: task_prompt.into(),
            ..SessionConfig::default()
        }
    }

    pub fn with_turn_limit(mut self, limit: usize) -> Self {
        self.chat_turn_limit = limit;
        self
    }

    pub fn with_output_language(mut self, language: impl Into<String>) -> Self {
        self.output_language = Some(language.into());
        self
    }

    pub fn validate(&self) -> Result<(), RolePlayError> {
        if self.assistant_role_name.trim().is_empty() {
            return Err(RolePlayError::Configuration("assistant 角色名不能为空".into()));
        }
        if self.user_role_name.trim().is_empty() {
            return Err(RolePlayError::Configuration("user 角色名不能为空".into()));
        }
        if self.task_prompt.trim().is_empty() {
            return Err(RolePlayError::Configuration("任务不能为空".into()));
        }
        if self.chat_turn_limit == 0 {
            return Err(RolePlayError::Configuration("chat_turn_limit 必须大于 0".into()));
        }
        if self.with_task_specify && self.word_limit == 0 {
            return Err(RolePlayError::Configuration("word_limit 必须大于 0".into()));
        }
        Ok(())
    }
}

/// 嵌套会话（role_playing_function）配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub turn_limit: usize,
    /// 折叠回父会话的嵌套 assistant 记忆条数
    pub transcript_tail: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            turn_limit: 50,
            transcript_tail: 4,
        }
    }
}

/// 统一配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub session: SessionConfig,
    pub bridge: BridgeConfig,
}

impl Config {
    /// 从文件加载配置，文件不存在时使用默认值
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败：{}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败：{}", path.display()))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 默认配置文件位置
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".duet")
            .join("config.toml")
    }

    /// 从默认位置加载配置，并应用环境变量覆盖
    pub fn load_default() -> Result<Self> {
        let mut config = Self::load(&Self::default_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// `OLLAMA_MODEL` / `OLLAMA_URL` 覆盖模型和地址
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            self.agent.model = model;
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.agent.base_url = url;
        }
    }
}
