use thiserror::Error;

use crate::session::SessionStatus;

/// 模型调用失败
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("网络错误：{0}")]
    Network(String),
    #[error("触发限流")]
    RateLimited,
    #[error("模型 API 错误：{status} - {body}")]
    Api { status: u16, body: String },
    #[error("模型响应格式错误：{0}")]
    Malformed(String),
    #[error("模型调用在 {attempts} 次尝试后仍然失败：{last}")]
    RetriesExhausted {
        attempts: usize,
        last: Box<ModelError>,
    },
}

impl ModelError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Network(_) | ModelError::RateLimited => true,
            ModelError::Api { status, .. } => *status >= 500,
            ModelError::Malformed(_) | ModelError::RetriesExhausted { .. } => false,
        }
    }
}

/// 角色扮演会话的错误
#[derive(Debug, Error)]
pub enum RolePlayError {
    #[error("模型调用失败：{0}")]
    ModelInvocation(#[from] ModelError),
    #[error("配置无效：{0}")]
    Configuration(String),
    #[error("会话已结束（{0}），不能继续执行")]
    SessionFinished(SessionStatus),
}

pub type Result<T, E = RolePlayError> = std::result::Result<T, E>;
