use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::AgentConfig;
use crate::error::ModelError;
use crate::types::{ChatMessage, Tool};

use super::llm::{Completion, ModelBackend};

/// 后端收到的一次请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

/// 预设脚本的模型后端，测试用。每次调用按顺序弹出一个结果，用完后返回 fallback 文本。
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Result<Completion, ModelError>>>,
    fallback: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Result<Completion, ModelError>>) -> Self {
        ScriptedBackend {
            scripts: Mutex::new(scripts.into()),
            fallback: "[no more scripts]".to_string(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 依次返回给定文本
    pub fn texts<S: AsRef<str>>(replies: &[S]) -> Self {
        Self::new(
            replies
                .iter()
                .map(|r| Ok(Completion::text(r.as_ref())))
                .collect(),
        )
    }

    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    /// 已收到的全部请求（按调用顺序）
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[Tool],
        _config: &AgentConfig,
    ) -> Result<Completion, ModelError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            tool_names: tools.iter().map(|t| t.function.name.clone()).collect(),
        });

        let next = self.scripts.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(Completion::text(self.fallback.clone())))
    }
}
