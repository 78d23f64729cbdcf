use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::{AgentResponse, AgentRole, ChatAgent, ModelBackend, TaskSpecifier};
use crate::config::{AgentConfig, SessionConfig};
use crate::error::{RolePlayError, Result};
use crate::prompts::{self, INIT_CHAT_PROMPT};
use crate::tools::FunctionRegistry;
use crate::types::Message;

use super::state::{SessionState, SessionStatus};

/// 每个 Agent 在一轮中的结果
pub type TurnResult = AgentResponse;

/// 一轮完整的交换，供外部渲染
#[derive(Debug, Clone, Serialize)]
pub struct TurnRecord {
    pub turn: usize,
    pub user: TurnResult,
    pub assistant: TurnResult,
}

/// 会话跑完后的结果
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub turn_count: usize,
    pub task_prompt: String,
    pub transcript: Vec<TurnRecord>,
}

/// 构造会话所需的全部参数
#[derive(Clone)]
pub struct RolePlayingOptions {
    pub session: SessionConfig,
    pub assistant: AgentConfig,
    pub user: AgentConfig,
    pub task_specify: AgentConfig,
    pub functions: Option<Arc<FunctionRegistry>>,
}

impl RolePlayingOptions {
    /// 三个 Agent 使用同一份模型配置
    pub fn new(session: SessionConfig, agent: AgentConfig) -> Self {
        RolePlayingOptions {
            session,
            assistant: agent.clone(),
            user: agent.clone(),
            task_specify: agent,
            functions: None,
        }
    }

    pub fn with_functions(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(registry);
        self
    }
}

/// 角色扮演控制器 - 驱动 user / assistant 两个 Agent 轮流对话
pub struct RolePlaying {
    id: Uuid,
    assistant_agent: ChatAgent,
    user_agent: ChatAgent,
    original_task_prompt: String,
    specified_task_prompt: Option<String>,
    task_prompt: String,
    state: SessionState,
    transcript: Vec<TurnRecord>,
}

impl RolePlaying {
    /// 校验配置、（可选）细化任务，并构造两个 Agent
    pub async fn create(options: RolePlayingOptions, backend: Arc<dyn ModelBackend>) -> Result<Self> {
        let RolePlayingOptions {
            session,
            assistant,
            user,
            task_specify,
            functions,
        } = options;

        session.validate()?;
        assistant.validate()?;
        user.validate()?;

        let original_task_prompt = session.task_prompt.trim().to_string();
        let output_language = session.output_language.as_deref();

        let specified_task_prompt = if session.with_task_specify {
            task_specify.validate()?;
            let specifier = TaskSpecifier::new(backend.clone(), task_specify, session.word_limit);
            let specified = specifier
                .specify(
                    &original_task_prompt,
                    &session.assistant_role_name,
                    &session.user_role_name,
                    output_language,
                )
                .await?;
            Some(specified)
        } else {
            None
        };

        let task_prompt = specified_task_prompt
            .clone()
            .unwrap_or_else(|| original_task_prompt.clone());

        let (assistant_prompt, user_prompt) = prompts::system_prompts(
            &session.assistant_role_name,
            &session.user_role_name,
            &task_prompt,
            output_language,
        );

        let mut assistant_agent = ChatAgent::new(
            AgentRole::assistant(session.assistant_role_name.clone()),
            assistant_prompt,
            assistant,
            backend.clone(),
        )?;
        let mut user_agent = ChatAgent::new(
            AgentRole::user(session.user_role_name.clone()),
            user_prompt,
            user,
            backend,
        )?;

        if let Some(registry) = functions {
            assistant_agent = assistant_agent.with_functions(registry.clone());
            user_agent = user_agent.with_functions(registry);
        }

        let id = Uuid::new_v4();
        info!(
            session = %id,
            assistant = %session.assistant_role_name,
            user = %session.user_role_name,
            turn_limit = session.chat_turn_limit,
            specified = specified_task_prompt.is_some(),
            "创建角色扮演会话"
        );

        Ok(RolePlaying {
            id,
            assistant_agent,
            user_agent,
            original_task_prompt,
            specified_task_prompt,
            task_prompt,
            state: SessionState::new(session.chat_turn_limit),
            transcript: Vec::new(),
        })
    }

    /// 第一轮的输入：以 assistant 的身份请 user 开始下指令
    pub fn init_chat(&self) -> Message {
        Message::assistant(self.assistant_agent.role().name.clone(), INIT_CHAT_PROMPT)
    }

    /// 执行一轮：user 回应输入，assistant 回应 user，然后检查终止与完成。
    /// 任一 Agent 调用模型失败时，本轮不会留下任何记录。
    pub async fn step(&mut self, input: &Message) -> Result<(TurnResult, TurnResult)> {
        if self.state.is_finished() {
            return Err(RolePlayError::SessionFinished(self.state.status().clone()));
        }

        let turn = self.state.turn_count() + 1;
        debug!(session = %self.id, turn, "开始新一轮");

        let user_pending = self.user_agent.draft(input).await?;
        let assistant_pending = self.assistant_agent.draft(user_pending.message()).await?;

        let user = self.user_agent.commit(user_pending);
        let assistant = self.assistant_agent.commit(assistant_pending);

        self.state.record_turn(&assistant, &user);
        self.transcript.push(TurnRecord {
            turn,
            user: user.clone(),
            assistant: assistant.clone(),
        });

        if self.state.is_finished() {
            info!(session = %self.id, turn, status = %self.state.status(), "会话结束");
        }

        Ok((assistant, user))
    }

    /// 从 `init_chat` 开始一直执行到结束，每轮结束后调用 `observer`
    pub async fn run<F>(&mut self, mut observer: F) -> Result<SessionOutcome>
    where
        F: FnMut(&TurnRecord) + Send,
    {
        let mut input = self.init_chat();

        while !self.state.is_finished() {
            let (assistant, _user) = self.step(&input).await?;
            if let Some(record) = self.transcript.last() {
                observer(record);
            }
            let content = prompts::strip_done_marker(assistant.message.content());
            input = assistant.message.with_content(content);
        }

        Ok(self.outcome())
    }

    pub fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            status: self.state.status().clone(),
            turn_count: self.state.turn_count(),
            task_prompt: self.task_prompt.clone(),
            transcript: self.transcript.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript(&self) -> &[TurnRecord] {
        &self.transcript
    }

    pub fn assistant_agent(&self) -> &ChatAgent {
        &self.assistant_agent
    }

    pub fn user_agent(&self) -> &ChatAgent {
        &self.user_agent
    }

    pub fn assistant_sys_msg(&self) -> &Message {
        self.assistant_agent.system_message()
    }

    pub fn user_sys_msg(&self) -> &Message {
        self.user_agent.system_message()
    }

    pub fn original_task_prompt(&self) -> &str {
        &self.original_task_prompt
    }

    pub fn specified_task_prompt(&self) -> Option<&str> {
        self.specified_task_prompt.as_deref()
    }

    /// 最终使用的任务
    pub fn task_prompt(&self) -> &str {
        &self.task_prompt
    }
}
