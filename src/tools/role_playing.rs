use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::agent::ModelBackend;
use crate::config::{AgentConfig, BridgeConfig, SessionConfig};
use crate::error::RolePlayError;
use crate::prompts::strip_done_marker;
use crate::session::{RolePlaying, RolePlayingOptions};
use crate::types::FunctionDefinition;

use super::registry::Function;

pub const ROLE_PLAYING_FUNCTION: &str = "role_playing_function";

static DEFINITION: Lazy<FunctionDefinition> = Lazy::new(|| FunctionDefinition {
    name: ROLE_PLAYING_FUNCTION.to_string(),
    description: "Every time you think it is difficult or uncertain to complete a task or act, \
this role-playing function can help. Input your task and the roles."
        .to_string(),
    parameters: serde_json::json!({
        "type": "object",
        "properties": {
            "task_prompt": {
                "type": "string",
                "description": "The task prompt for the AI assistant."
            },
            "input": {
                "type": "string",
                "description": "The input information for the task."
            },
            "user_role": {
                "type": "string",
                "description": "The role of the AI user."
            },
            "assistant_role": {
                "type": "string",
                "description": "The role of the AI assistant."
            },
            "output_language": {
                "type": "string",
                "description": "The language of expected response."
            }
        },
        "required": ["task_prompt", "input", "user_role", "assistant_role", "output_language"]
    }),
});

/// 把难以完成的子任务交给一个全新的嵌套角色扮演会话。
/// 只持有后端和配置，不引用任何父会话。
#[derive(Clone)]
pub struct RolePlayingFunction {
    backend: Arc<dyn ModelBackend>,
    agent_config: AgentConfig,
    bridge: BridgeConfig,
}

impl RolePlayingFunction {
    pub fn new(backend: Arc<dyn ModelBackend>, agent_config: AgentConfig, bridge: BridgeConfig) -> Self {
        RolePlayingFunction {
            backend,
            agent_config,
            bridge,
        }
    }

    /// 运行嵌套会话，返回任务加上嵌套 assistant 最近几条记忆
    pub async fn invoke(
        &self,
        task_description: &str,
        context: &str,
        user_role: &str,
        assistant_role: &str,
        output_language: &str,
    ) -> Result<String, RolePlayError> {
        info!(assistant = %assistant_role, user = %user_role, "启动嵌套角色扮演处理子任务");

        let task_prompt = format!("{}\n{}", task_description, context);

        let mut session_config = SessionConfig::new(assistant_role, user_role, task_prompt)
            .with_turn_limit(self.bridge.turn_limit);
        if !output_language.trim().is_empty() {
            session_config = session_config.with_output_language(output_language);
        }

        let options = RolePlayingOptions::new(session_config, self.agent_config.clone());
        let mut session = RolePlaying::create(options, self.backend.clone()).await?;

        let outcome = session
            .run(|record| debug!(turn = record.turn, "嵌套会话完成一轮"))
            .await?;
        info!(status = %outcome.status, turns = outcome.turn_count, "嵌套会话结束");

        // 回显嵌套会话实际使用的任务文本
        let mut reply = format!("{}\n", session.original_task_prompt());
        for record in session.assistant_agent().memory().tail(self.bridge.transcript_tail) {
            reply.push_str(&strip_done_marker(record.message.content()));
            reply.push('\n');
        }

        Ok(reply)
    }
}

#[async_trait]
impl Function for RolePlayingFunction {
    fn definition(&self) -> FunctionDefinition {
        DEFINITION.clone()
    }

    async fn call(&self, args: &HashMap<String, Value>) -> Result<String> {
        let arg = |name: &str| -> Result<String> {
            args.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .with_context(|| format!("缺少 {} 参数", name))
        };

        let task_prompt = arg("task_prompt")?;
        let input = args.get("input").and_then(|v| v.as_str()).unwrap_or_default();
        let user_role = arg("user_role")?;
        let assistant_role = arg("assistant_role")?;
        let output_language = args
            .get("output_language")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let reply = self
            .invoke(&task_prompt, input, &user_role, &assistant_role, output_language)
            .await?;
        Ok(reply)
    }
}
