use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AgentConfig;
use crate::error::{ModelError, RolePlayError};
use crate::tools::{FunctionCallRecord, FunctionRegistry, ToolExecutor};
use crate::types::{ChatMessage, Message, Role, PRODUCER_KEY};

use super::llm::{Completion, ModelBackend};
use super::memory::ChatMemory;

pub const REASON_MAX_TOKENS: &str = "max_tokens_exceeded";
pub const REASON_MAX_FUNCTION_ROUNDS: &str = "max_function_rounds_exceeded";

/// Agent 扮演的角色：assistant 和 user 只在这里有区别
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRole {
    pub kind: Role,
    pub name: String,
}

impl AgentRole {
    pub fn assistant(name: impl Into<String>) -> Self {
        AgentRole {
            kind: Role::Assistant,
            name: name.into(),
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        AgentRole {
            kind: Role::User,
            name: name.into(),
        }
    }
}

/// Agent 一步的结果
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub message: Message,
    pub terminated: bool,
    pub info: Map<String, Value>,
}

impl AgentResponse {
    pub fn termination_reasons(&self) -> Vec<String> {
        termination_reasons(&self.info)
    }
}

/// 已经生成、尚未写入记忆的回复
#[derive(Debug, Clone)]
pub struct PendingResponse {
    input: Message,
    response: AgentResponse,
}

impl PendingResponse {
    pub fn message(&self) -> &Message {
        &self.response.message
    }

    pub fn terminated(&self) -> bool {
        self.response.terminated
    }
}

pub struct ChatAgent {
    id: Uuid,
    role: AgentRole,
    system_message: Message,
    config: AgentConfig,
    backend: Arc<dyn ModelBackend>,
    executor: Option<ToolExecutor>,
    memory: ChatMemory,
}

impl ChatAgent {
    pub fn new(
        role: AgentRole,
        system_prompt: impl Into<String>,
        config: AgentConfig,
        backend: Arc<dyn ModelBackend>,
    ) -> Result<Self, RolePlayError> {
        config.validate()?;
        if role.name.trim().is_empty() {
            return Err(RolePlayError::Configuration("角色名不能为空".into()));
        }
        if role.kind == Role::System {
            return Err(RolePlayError::Configuration("Agent 不能扮演 system 角色".into()));
        }

        let id = Uuid::new_v4();
        let system_message = Message::system(role.name.clone(), system_prompt);

        Ok(ChatAgent {
            id,
            role,
            system_message,
            config,
            backend,
            executor: None,
            memory: ChatMemory::new(id),
        })
    }

    /// 允许该 Agent 调用注册表里的函数
    pub fn with_functions(mut self, registry: Arc<FunctionRegistry>) -> Self {
        if !registry.is_empty() {
            self.executor = Some(ToolExecutor::new(registry));
        }
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> &AgentRole {
        &self.role
    }

    pub fn system_message(&self) -> &Message {
        &self.system_message
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    /// 生成回复并写入记忆
    pub async fn respond(&mut self, input: &Message) -> Result<AgentResponse, ModelError> {
        let pending = self.draft(input).await?;
        Ok(self.commit(pending))
    }

    /// 生成回复，不修改记忆；失败时 Agent 状态保持不变
    pub async fn draft(&self, input: &Message) -> Result<PendingResponse, ModelError> {
        let tools = self
            .executor
            .as_ref()
            .map(|e| e.get_tools())
            .unwrap_or_default();

        let mut history = self.memory.window(self.config.message_window);
        history.push(input.to_chat_message(Role::User));

        let mut calls: Vec<FunctionCallRecord> = Vec::new();
        let mut reasons: Vec<String> = Vec::new();
        let mut rounds = 0;

        let completion = loop {
            let completion = self
                .backend
                .complete(self.system_message.content(), &history, &tools, &self.config)
                .await?;

            let executor = match &self.executor {
                Some(executor) if !completion.tool_calls.is_empty() => executor,
                _ => break completion,
            };

            rounds += 1;
            if rounds > self.config.max_function_rounds {
                warn!(agent = %self.role.name, rounds, "函数调用轮数超过上限");
                reasons.push(REASON_MAX_FUNCTION_ROUNDS.to_string());
                break completion;
            }

            let tool_calls = ToolExecutor::normalize(&completion.tool_calls);
            history.push(ChatMessage::assistant_tool_calls(
                &completion.content,
                tool_calls.clone(),
            ));

            for record in executor.execute_tool_calls(&tool_calls).await {
                history.push(ChatMessage::tool_result(&record.id, &record.result));
                calls.push(record);
            }
        };

        reasons.extend(self.termination_reasons_for(&completion));
        let terminated = !reasons.is_empty();
        if terminated {
            info!(agent = %self.role.name, ?reasons, "Agent 终止");
        }

        let mut info = Map::new();
        info.insert("id".into(), Value::from(self.id.to_string()));
        info.insert("model".into(), Value::from(self.config.model.clone()));
        info.insert("termination_reasons".into(), Value::from(reasons));
        if !calls.is_empty() {
            info.insert(
                "function_calls".into(),
                serde_json::to_value(&calls).unwrap_or(Value::Null),
            );
        }

        let message = Message::new(self.role.kind, self.role.name.clone(), completion.content)
            .with_metadata(PRODUCER_KEY, Value::from(self.id.to_string()));
        debug!(agent = %self.role.name, chars = message.content().len(), "生成回复");

        Ok(PendingResponse {
            input: input.clone(),
            response: AgentResponse {
                message,
                terminated,
                info,
            },
        })
    }

    /// 把输入和输出依次写入记忆
    pub fn commit(&mut self, pending: PendingResponse) -> AgentResponse {
        self.memory.record_input(pending.input);
        self.memory.record_output(pending.response.message.clone());
        pending.response
    }

    fn termination_reasons_for(&self, completion: &Completion) -> Vec<String> {
        let mut reasons = Vec::new();
        if completion.truncated {
            reasons.push(REASON_MAX_TOKENS.to_string());
        }
        for marker in &self.config.termination_markers {
            if !marker.is_empty() && completion.content.contains(marker.as_str()) {
                reasons.push(format!("termination_marker:{}", marker));
            }
        }
        reasons
    }
}

/// 从 info 中读出终止原因
pub fn termination_reasons(info: &Map<String, Value>) -> Vec<String> {
    info.get("termination_reasons")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::ScriptedBackend;
    use crate::tools::registry::tests::Echo;
    use crate::types::{FunctionCall, ToolCall};

    fn agent(backend: Arc<ScriptedBackend>, config: AgentConfig) -> ChatAgent {
        ChatAgent::new(AgentRole::assistant("Tutor"), "you are a tutor", config, backend).unwrap()
    }

    fn echo_call(text: &str) -> ToolCall {
        ToolCall {
            id: String::new(),
            tool_type: None,
            function: FunctionCall {
                name: "echo".into(),
                index: None,
                arguments: serde_json::json!({ "text": text }),
            },
        }
    }

    #[tokio::test]
    async fn respond_appends_input_then_output() {
        let backend = Arc::new(ScriptedBackend::texts(&["first", "second"]));
        let mut agent = agent(backend.clone(), AgentConfig::default());

        let r1 = agent.respond(&Message::user("Student", "q1")).await.unwrap();
        let r2 = agent.respond(&Message::user("Student", "q2")).await.unwrap();

        assert_eq!(r1.message.content(), "first");
        assert_eq!(r2.message.role(), Role::Assistant);
        assert_eq!(r2.message.role_name(), "Tutor");
        assert!(!r2.terminated);

        let contents: Vec<&str> = agent
            .memory()
            .records()
            .iter()
            .map(|r| r.message.content())
            .collect();
        assert_eq!(contents, vec!["q1", "first", "q2", "second"]);

        // 第二次调用时，模型能看到之前的对话
        let second = &backend.requests()[1];
        assert_eq!(second.system_prompt, "you are a tutor");
        assert_eq!(second.history.len(), 3);
        assert_eq!(second.history[1].role, "assistant");
    }

    #[tokio::test]
    async fn failed_call_leaves_memory_untouched() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err(ModelError::Network(
            "refused".into(),
        ))]));
        let mut agent = agent(backend, AgentConfig::default());

        let err = agent.respond(&Message::user("Student", "q")).await.unwrap_err();
        assert!(matches!(err, ModelError::Network(_)));
        assert!(agent.memory().is_empty());
    }

    #[tokio::test]
    async fn draft_does_not_touch_memory_until_commit() {
        let backend = Arc::new(ScriptedBackend::texts(&["reply"]));
        let mut agent = agent(backend, AgentConfig::default());

        let pending = agent.draft(&Message::user("Student", "q")).await.unwrap();
        assert!(agent.memory().is_empty());
        assert_eq!(pending.message().content(), "reply");

        agent.commit(pending);
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn termination_marker_sets_terminated() {
        let backend = Arc::new(ScriptedBackend::texts(&["I give up <<STOP>>"]));
        let config = AgentConfig::default().with_termination_marker("<<STOP>>");
        let mut agent = agent(backend, config);

        let response = agent.respond(&Message::user("Student", "q")).await.unwrap();
        assert!(response.terminated);
        assert_eq!(
            response.termination_reasons(),
            vec!["termination_marker:<<STOP>>".to_string()]
        );
    }

    #[tokio::test]
    async fn truncated_output_terminates() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(Completion {
            content: "partial".into(),
            tool_calls: vec![],
            truncated: true,
        })]));
        let mut agent = agent(backend, AgentConfig::default());

        let response = agent.respond(&Message::user("Student", "q")).await.unwrap();
        assert!(response.terminated);
        assert_eq!(response.termination_reasons(), vec![REASON_MAX_TOKENS.to_string()]);
    }

    #[tokio::test]
    async fn function_calls_run_in_scratch_context() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![echo_call("from tool")],
                truncated: false,
            }),
            Ok(Completion::text("final answer")),
        ]));
        let registry = Arc::new(FunctionRegistry::new().with(Arc::new(Echo)));
        let mut agent = agent(backend.clone(), AgentConfig::default()).with_functions(registry);

        let response = agent.respond(&Message::user("Student", "q")).await.unwrap();
        assert_eq!(response.message.content(), "final answer");
        assert!(!response.terminated);

        let calls = response.info["function_calls"].as_array().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["result"], "from tool");

        // 第二次请求带上了工具调用和结果
        let requests = backend.requests();
        assert_eq!(requests[0].tool_names, vec!["echo".to_string()]);
        let history = &requests[1].history;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].role, "tool");
        assert_eq!(history[2].content, "from tool");

        // 记忆里只有输入和最终输出
        assert_eq!(agent.memory().len(), 2);
    }

    #[tokio::test]
    async fn too_many_function_rounds_terminates() {
        let tool_reply = || {
            Ok(Completion {
                content: String::new(),
                tool_calls: vec![echo_call("again")],
                truncated: false,
            })
        };
        let backend = Arc::new(ScriptedBackend::new(vec![tool_reply(), tool_reply()]));
        let registry = Arc::new(FunctionRegistry::new().with(Arc::new(Echo)));
        let mut config = AgentConfig::default();
        config.max_function_rounds = 1;
        let mut agent = agent(backend.clone(), config).with_functions(registry);

        let response = agent.respond(&Message::user("Student", "q")).await.unwrap();
        assert!(response.terminated);
        assert_eq!(
            response.termination_reasons(),
            vec![REASON_MAX_FUNCTION_ROUNDS.to_string()]
        );
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn tool_calls_are_ignored_without_functions() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(Completion {
            content: "plain".into(),
            tool_calls: vec![echo_call("x")],
            truncated: false,
        })]));
        let mut agent = agent(backend.clone(), AgentConfig::default());

        let response = agent.respond(&Message::user("Student", "q")).await.unwrap();
        assert_eq!(response.message.content(), "plain");
        assert_eq!(backend.call_count(), 1);
        assert!(backend.requests()[0].tool_names.is_empty());
    }

    #[test]
    fn construction_rejects_invalid_roles() {
        let backend: Arc<dyn ModelBackend> = Arc::new(ScriptedBackend::texts::<&str>(&[]));
        let blank = ChatAgent::new(AgentRole::user("  "), "p", AgentConfig::default(), backend.clone());
        assert!(matches!(blank, Err(RolePlayError::Configuration(_))));

        let system = AgentRole {
            kind: Role::System,
            name: "sys".into(),
        };
        assert!(ChatAgent::new(system, "p", AgentConfig::default(), backend).is_err());
    }
}
