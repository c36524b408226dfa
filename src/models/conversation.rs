//! 对话记录数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// 默认保留的最近消息数
pub const DEFAULT_MAX_HISTORY: usize = 10;

/// 单条对话消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// 消息内容
    pub content: String,

    /// 发送时间
    pub timestamp: DateTime<Utc>,

    /// 是否由机器人发送
    #[serde(default)]
    pub from_bot: bool,
}

impl ConversationMessage {
    pub fn new(content: impl Into<String>, from_bot: bool) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
            from_bot,
        }
    }
}

/// 有界对话历史
///
/// 追加时淘汰最旧的消息，内存中的长度与落盘长度始终一致。
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    messages: VecDeque<ConversationMessage>,
    capacity: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 由已保存的消息重建，超出上限时只保留最新的部分
    pub fn from_messages(messages: Vec<ConversationMessage>, capacity: usize) -> Self {
        let mut history = Self::with_capacity(capacity);
        for message in messages {
            history.push(message);
        }
        history
    }

    /// 追加消息
    pub fn push(&mut self, message: ConversationMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    pub fn to_vec(&self) -> Vec<ConversationMessage> {
        self.messages.iter().cloned().collect()
    }
}

/// 对话摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// 摘要文本
    #[serde(default)]
    pub summary: String,

    /// 更新时间
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            updated_at: Utc::now(),
        }
    }
}
