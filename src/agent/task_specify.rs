use std::sync::Arc;
use tracing::info;

use crate::config::AgentConfig;
use crate::error::ModelError;
use crate::prompts::{render, OUTPUT_LANGUAGE_PROMPT, TASK_SPECIFIER_SYSTEM_PROMPT, TASK_SPECIFY_PROMPT};
use crate::types::{ChatMessage, Message, Role};

use super::llm::ModelBackend;

/// 任务细化 - 在对话开始前把原始任务改写得更具体
pub struct TaskSpecifier {
    backend: Arc<dyn ModelBackend>,
    config: AgentConfig,
    word_limit: usize,
}

impl TaskSpecifier {
    pub fn new(backend: Arc<dyn ModelBackend>, config: AgentConfig, word_limit: usize) -> Self {
        TaskSpecifier {
            backend,
            config,
            word_limit,
        }
    }

    pub async fn specify(
        &self,
        task: &str,
        assistant_role: &str,
        user_role: &str,
        output_language: Option<&str>,
    ) -> Result<String, ModelError> {
        let word_limit = self.word_limit.to_string();
        let mut prompt = render(
            TASK_SPECIFY_PROMPT,
            &[
                ("assistant_role", assistant_role),
                ("user_role", user_role),
                ("task", task),
                ("word_limit", &word_limit),
            ],
        );
        if let Some(language) = output_language {
            prompt.push_str(&render(OUTPUT_LANGUAGE_PROMPT, &[("output_language", language)]));
        }

        let request = Message::user("Task Specifier", prompt);
        let history: Vec<ChatMessage> = vec![request.to_chat_message(Role::User)];
        let completion = self
            .backend
            .complete(TASK_SPECIFIER_SYSTEM_PROMPT, &history, &[], &self.config)
            .await?;

        let specified = completion.content.trim().to_string();
        if specified.is_empty() {
            return Err(ModelError::Malformed("细化后的任务为空".into()));
        }

        info!(chars = specified.len(), "任务细化完成");
        Ok(specified)
    }
}
