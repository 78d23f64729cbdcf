use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::{ChatMessage, Message, Role};

/// 记忆记录 - 一条消息加上来源信息
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRecord {
    pub message: Message,
    /// 产生这条消息的 Agent；None 表示控制器构造的种子消息
    pub producer: Option<Uuid>,
    pub role_name: String,
    pub seq: u64,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn is_own(&self, owner: Uuid) -> bool {
        self.producer == Some(owner)
    }
}

/// 对话记忆 - 只追加，不修改、不删除
#[derive(Debug)]
pub struct ChatMemory {
    owner: Uuid,
    records: Vec<MemoryRecord>,
}

impl ChatMemory {
    pub fn new(owner: Uuid) -> Self {
        ChatMemory {
            owner,
            records: Vec::new(),
        }
    }

    /// 记录对方发来的消息，来源取自消息本身
    pub fn record_input(&mut self, message: Message) {
        let producer = message.producer();
        self.push(message, producer);
    }

    /// 记录自己产生的消息
    pub fn record_output(&mut self, message: Message) {
        self.push(message, Some(self.owner));
    }

    fn push(&mut self, message: Message, producer: Option<Uuid>) {
        let seq = self.records.len() as u64;
        self.records.push(MemoryRecord {
            role_name: message.role_name().to_string(),
            message,
            producer,
            seq,
            recorded_at: Utc::now(),
        });
    }

    /// 全部记录，按时间顺序
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    /// 最近的 N 条记录
    pub fn tail(&self, n: usize) -> &[MemoryRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// 生成发送给模型的历史：自己说的是 assistant，对方说的是 user
    pub fn window(&self, window: Option<usize>) -> Vec<ChatMessage> {
        let records = match window {
            Some(n) => self.tail(n),
            None => self.records(),
        };

        records
            .iter()
            .map(|r| {
                let wire_role = if r.is_own(self.owner) {
                    Role::Assistant
                } else {
                    Role::User
                };
                r.message.to_chat_message(wire_role)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
