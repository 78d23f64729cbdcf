use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::ollama::ChatMessage;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Assistant,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Assistant => "assistant",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 元数据中记录产生该消息的 Agent id
pub const PRODUCER_KEY: &str = "producer";

/// 一条对话消息，创建后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    role_name: String,
    content: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
}

impl Message {
    pub fn new(role: Role, role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role,
            role_name: role_name.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn system(role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::System, role_name, content)
    }

    pub fn assistant(role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, role_name, content)
    }

    pub fn user(role_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(Role::User, role_name, content)
    }

    /// 附加一条元数据，返回新的消息
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 替换内容，角色和元数据保持不变
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Message {
            role: self.role,
            role_name: self.role_name.clone(),
            content: content.into(),
            metadata: self.metadata.clone(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// 产生这条消息的 Agent；由控制器直接构造的消息没有
    pub fn producer(&self) -> Option<Uuid> {
        self.metadata
            .get(PRODUCER_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// 转换为模型请求里的消息；`wire_role` 由调用方决定（自己说的话是 assistant，别人说的是 user）
    pub fn to_chat_message(&self, wire_role: Role) -> ChatMessage {
        ChatMessage {
            role: wire_role.as_str().to_string(),
            content: self.content.clone(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_content_keeps_role_and_metadata() {
        let msg = Message::user("Math Student", "hello")
            .with_metadata("turn", Value::from(2));
        let edited = msg.with_content("bye");

        assert_eq!(edited.role(), Role::User);
        assert_eq!(edited.role_name(), "Math Student");
        assert_eq!(edited.content(), "bye");
        assert_eq!(edited.metadata().get("turn"), Some(&Value::from(2)));
        assert_eq!(msg.content(), "hello");
    }

    #[test]
    fn producer_is_read_from_metadata() {
        let id = Uuid::new_v4();
        let msg = Message::assistant("Tutor", "x").with_metadata(PRODUCER_KEY, Value::from(id.to_string()));
        assert_eq!(msg.producer(), Some(id));
        assert_eq!(msg.with_content("y").producer(), Some(id));
        assert_eq!(Message::user("Student", "x").producer(), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn wire_role_is_chosen_by_caller() {
        let msg = Message::assistant("Tutor", "x");
        assert_eq!(msg.to_chat_message(Role::User).role, "user");
    }
}
