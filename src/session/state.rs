use serde::Serialize;
use std::fmt;

use crate::agent::AgentResponse;
use crate::prompts::TASK_DONE_MARKER;
use crate::types::{Message, Role};

/// 会话状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    /// 对话中出现了完成标记
    Completed,
    /// 某个 Agent 主动终止
    Terminated { by: Role, reasons: Vec<String> },
    /// 用完轮数仍未完成
    LimitReached,
}

impl SessionStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Completed => f.write_str("completed"),
            SessionStatus::Terminated { by, reasons } => {
                write!(f, "terminated by {}: {}", by, reasons.join(", "))
            }
            SessionStatus::LimitReached => f.write_str("turn limit reached"),
        }
    }
}

/// 会话状态，只由控制器修改，每轮一次
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    turn_count: usize,
    turn_limit: usize,
    assistant_terminated: bool,
    user_terminated: bool,
    termination_reason: Option<String>,
    /// 最近一轮的 (assistant, user) 消息
    last_exchange: Option<(Message, Message)>,
    status: SessionStatus,
}

impl SessionState {
    pub fn new(turn_limit: usize) -> Self {
        SessionState {
            turn_count: 0,
            turn_limit,
            assistant_terminated: false,
            user_terminated: false,
            termination_reason: None,
            last_exchange: None,
            status: SessionStatus::Running,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turn_count
    }

    pub fn turn_limit(&self) -> usize {
        self.turn_limit
    }

    pub fn assistant_terminated(&self) -> bool {
        self.assistant_terminated
    }

    pub fn user_terminated(&self) -> bool {
        self.user_terminated
    }

    pub fn termination_reason(&self) -> Option<&str> {
        self.termination_reason.as_deref()
    }

    pub fn last_exchange(&self) -> Option<&(Message, Message)> {
        self.last_exchange.as_ref()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// 记录一轮完整的交换并推进状态。
    /// 终止信号优先于完成标记；双方都终止时以 assistant 为准。
    pub(crate) fn record_turn(&mut self, assistant: &AgentResponse, user: &AgentResponse) {
        debug_assert!(!self.is_finished());

        self.turn_count += 1;
        self.assistant_terminated = assistant.terminated;
        self.user_terminated = user.terminated;
        self.last_exchange = Some((assistant.message.clone(), user.message.clone()));

        let terminated_by = if assistant.terminated {
            Some((Role::Assistant, assistant.termination_reasons()))
        } else if user.terminated {
            Some((Role::User, user.termination_reasons()))
        } else {
            None
        };

        self.status = if let Some((by, reasons)) = terminated_by {
            self.termination_reason = Some(reasons.join(", "));
            SessionStatus::Terminated { by, reasons }
        } else if contains_done_marker(&assistant.message) || contains_done_marker(&user.message) {
            SessionStatus::Completed
        } else if self.turn_count >= self.turn_limit {
            SessionStatus::LimitReached
        } else {
            SessionStatus::Running
        };
    }
}

fn contains_done_marker(message: &Message) -> bool {
    message.content().contains(TASK_DONE_MARKER)
}
