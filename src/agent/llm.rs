use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::AgentConfig;
use crate::error::ModelError;
use crate::types::{ChatMessage, OllamaOptions, OllamaRequest, OllamaResponse, Tool, ToolCall};

/// 一次模型调用的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// 输出因 token 上限被截断
    pub truncated: bool,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Completion {
            content: content.into(),
            ..Completion::default()
        }
    }
}

/// 模型调用接口：传输、鉴权、重试都在实现内部处理
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[Tool],
        config: &AgentConfig,
    ) -> Result<Completion, ModelError>;
}

/// Ollama `/api/chat` 客户端
pub struct OllamaClient {
    client: Client,
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaClient {
    pub fn new() -> Self {
        OllamaClient {
            client: Client::new(),
        }
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
        config: &AgentConfig,
    ) -> Result<Completion, ModelError> {
        let request = OllamaRequest {
            model: config.model.clone(),
            messages: messages.to_vec(),
            tools: (!tools.is_empty()).then(|| tools.to_vec()),
            options: OllamaOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
            stream: false,
        };

        let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Network(format!("读取响应失败：{}", e)))?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ModelError::RateLimited);
        }
        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_response(&text)
    }
}

fn parse_response(text: &str) -> Result<Completion, ModelError> {
    let response: OllamaResponse = serde_json::from_str(text)
        .map_err(|e| ModelError::Malformed(format!("{}，原始内容：{}", e, text)))?;

    if let Some(err) = response.error {
        return Err(ModelError::Malformed(format!("Ollama 错误：{}", err)));
    }
    if !response.done {
        return Err(ModelError::Malformed("响应未完成".into()));
    }

    Ok(Completion {
        content: response.message.content,
        tool_calls: response.message.tool_calls.unwrap_or_default(),
        truncated: response.done_reason.as_deref() == Some("length"),
    })
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        tools: &[Tool],
        config: &AgentConfig,
    ) -> Result<Completion, ModelError> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());

        let attempts = config.max_llm_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.chat(&messages, tools, config).await {
                Ok(completion) => {
                    debug!(model = %config.model, attempt, "模型调用成功");
                    return Ok(completion);
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(
                        model = %config.model,
                        attempt,
                        attempts,
                        error = %e,
                        "模型调用失败，正在重试"
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * (1 << attempt)))
                        .await;
                    last_error = Some(e);
                }
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(ModelError::RetriesExhausted {
            attempts,
            last: Box::new(last_error.unwrap_or(ModelError::Malformed("无响应".into()))),
        })
    }
}
