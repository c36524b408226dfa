//! 内存状态容器
//!
//! 存储层在加载时填充、保存时读取这些容器；运行期间由对话、情感等协作方直接修改。
//! 所有条目以用户 ID 为键，彼此之间只通过 ID 引用。

use crate::models::{
    ConversationHistory, ConversationMessage, ConversationSummary, EmotionMap,
    InteractionStats, Relationship, UserId, UserProfile, DEFAULT_MAX_HISTORY,
};
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 情感侧的容器
#[derive(Debug, Clone, Default)]
pub struct EmotionState {
    /// 情感字段
    pub user_emotions: HashMap<UserId, EmotionMap>,
    /// 记忆
    pub user_memories: HashMap<UserId, Vec<Value>>,
    /// 生活事件
    pub user_events: HashMap<UserId, Vec<Value>>,
    /// 里程碑
    pub user_milestones: HashMap<UserId, Vec<Value>>,
    /// 互动统计
    pub interaction_stats: HashMap<UserId, InteractionStats>,
    /// 关系进展
    pub relationship_progress: HashMap<UserId, Relationship>,
    /// 允许私信的用户
    pub dm_enabled_users: HashSet<UserId>,
}

impl EmotionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空所有容器
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// 获取情感字段，首次访问时创建
    pub fn emotions_mut(&mut self, user_id: UserId) -> &mut EmotionMap {
        self.user_emotions.entry(user_id).or_insert_with(|| {
            let mut emotions = EmotionMap::new();
            emotions.insert(
                "first_interaction".into(),
                Value::String(Utc::now().to_rfc3339()),
            );
            emotions
        })
    }

    /// 获取关系进展，首次访问时创建
    pub fn relationship_mut(&mut self, user_id: UserId) -> &mut Relationship {
        self.relationship_progress.entry(user_id).or_default()
    }

    /// 记录一次互动并返回该类互动的累计次数
    pub fn record_interaction(&mut self, user_id: UserId, kind: &str) -> i64 {
        let count = self
            .interaction_stats
            .entry(user_id)
            .or_default()
            .entry(kind.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    pub fn add_memory(&mut self, user_id: UserId, memory: Value) {
        self.user_memories.entry(user_id).or_default().push(memory);
    }

    pub fn add_event(&mut self, user_id: UserId, event: Value) {
        self.user_events.entry(user_id).or_default().push(event);
    }

    pub fn add_milestone(&mut self, user_id: UserId, milestone: Value) {
        self.user_milestones.entry(user_id).or_default().push(milestone);
    }

    /// 设置私信许可
    pub fn set_dm_enabled(&mut self, user_id: UserId, enabled: bool) {
        if enabled {
            self.dm_enabled_users.insert(user_id);
        } else {
            self.dm_enabled_users.remove(&user_id);
        }
    }

    pub fn is_dm_enabled(&self, user_id: UserId) -> bool {
        self.dm_enabled_users.contains(&user_id)
    }
}

/// 对话侧的容器
#[derive(Debug, Clone)]
pub struct ConversationState {
    /// 对话历史
    pub conversations: HashMap<UserId, ConversationHistory>,
    /// 对话摘要
    pub summaries: HashMap<UserId, ConversationSummary>,
    /// 用户画像
    pub user_profiles: HashMap<UserId, UserProfile>,
    max_history: usize,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl ConversationState {
    pub fn new(max_history: usize) -> Self {
        Self {
            conversations: HashMap::new(),
            summaries: HashMap::new(),
            user_profiles: HashMap::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// 清空所有容器，保留历史上限
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.summaries.clear();
        self.user_profiles.clear();
    }

    /// 追加一条消息，超出上限时淘汰最旧的
    pub fn add_message(&mut self, user_id: UserId, content: impl Into<String>, from_bot: bool) {
        let max_history = self.max_history;
        self.conversations
            .entry(user_id)
            .or_insert_with(|| ConversationHistory::with_capacity(max_history))
            .push(ConversationMessage::new(content, from_bot));
    }

    /// 用已保存的消息替换某用户的历史
    pub fn restore_history(&mut self, user_id: UserId, messages: Vec<ConversationMessage>) {
        self.conversations.insert(
            user_id,
            ConversationHistory::from_messages(messages, self.max_history),
        );
    }

    /// 格式化对话历史，每行 `发送方: 内容`
    pub fn format_history(&self, user_id: UserId, bot_label: &str) -> String {
        match self.conversations.get(&user_id) {
            Some(history) if !history.is_empty() => history
                .iter()
                .map(|m| {
                    let sender = if m.from_bot { bot_label } else { "User" };
                    format!("{}: {}", sender, m.content)
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => "No prior conversation.".to_string(),
        }
    }

    /// 设置对话摘要
    pub fn set_summary(&mut self, user_id: UserId, summary: impl Into<String>) {
        self.summaries
            .insert(user_id, ConversationSummary::new(summary));
    }

    /// 获取画像，不存在时创建
    pub fn get_or_create_profile(
        &mut self,
        user_id: UserId,
        username: Option<&str>,
    ) -> &mut UserProfile {
        self.user_profiles.entry(user_id).or_insert_with(|| {
            let mut profile = UserProfile::new(user_id);
            profile.name = username.map(str::to_string);
            profile
        })
    }

    /// 更新称呼，只覆盖非空参数
    pub fn update_name_recognition(
        &mut self,
        user_id: UserId,
        name: Option<&str>,
        nickname: Option<&str>,
        preferred_name: Option<&str>,
    ) -> &UserProfile {
        let profile = self.get_or_create_profile(user_id, None);
        let non_empty = |s: Option<&str>| s.filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(name) = non_empty(name) {
            profile.name = Some(name);
        }
        if let Some(nickname) = non_empty(nickname) {
            profile.nickname = Some(nickname);
        }
        if let Some(preferred_name) = non_empty(preferred_name) {
            profile.preferred_name = Some(preferred_name);
        }
        profile.touch();
        profile
    }

    /// 用户当前应使用的称呼
    pub fn preferred_name(&self, user_id: UserId) -> Option<&str> {
        self.user_profiles
            .get(&user_id)
            .and_then(UserProfile::display_name)
    }
}

/// 全部内存状态
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    pub emotions: EmotionState,
    pub conversations: ConversationState,
}

impl StoreState {
    pub fn new(max_history: usize) -> Self {
        Self {
            emotions: EmotionState::new(),
            conversations: ConversationState::new(max_history),
        }
    }

    /// 包装为可共享的句柄
    pub fn into_handle(self) -> StateHandle {
        Arc::new(RwLock::new(self))
    }
}

/// 进程内共享的状态句柄，由顶层创建后交给存储服务和各协作方
pub type StateHandle = Arc<RwLock<StoreState>>;
