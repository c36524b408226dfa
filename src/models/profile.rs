//! 用户画像数据模型
//!
//! 记录 Agent 在对话中了解到的用户信息：称呼、性格、兴趣、重要事实和关系背景。

use super::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 摘要中最多展示的性格特征数
const SUMMARY_TRAITS: usize = 3;
/// 摘要中最多展示的兴趣数
const SUMMARY_INTERESTS: usize = 3;
/// 摘要中最多展示的重要事实数
const SUMMARY_FACTS: usize = 2;
/// 摘要中最多展示的关系背景数
const SUMMARY_RELATIONSHIP: usize = 2;

/// 用户画像
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    /// 用户 ID，`None` 表示文档中缺失
    pub user_id: Option<UserId>,

    /// === 称呼 ===
    /// 姓名
    pub name: Option<String>,

    /// 昵称
    pub nickname: Option<String>,

    /// 用户希望被称呼的名字
    pub preferred_name: Option<String>,

    /// === 画像内容 ===
    /// 性格特征
    pub personality_traits: Vec<String>,

    /// 兴趣
    pub interests: Vec<String>,

    /// 重要事实
    pub notable_facts: Vec<String>,

    /// 关系背景
    pub relationship_context: Vec<String>,

    /// 聊过的话题
    pub conversation_topics: Vec<String>,

    /// === 元数据 ===
    /// 创建时间，构造后不再改变
    pub created_at: DateTime<Utc>,

    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

/// 可通过 [`UserProfile::update_field`] 修改的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileField {
    Name,
    Nickname,
    PreferredName,
    PersonalityTraits,
    Interests,
    NotableFacts,
    RelationshipContext,
    ConversationTopics,
}

type Setter = fn(&mut UserProfile, Value) -> Result<(), serde_json::Error>;

impl ProfileField {
    pub const ALL: [ProfileField; 8] = [
        ProfileField::Name,
        ProfileField::Nickname,
        ProfileField::PreferredName,
        ProfileField::PersonalityTraits,
        ProfileField::Interests,
        ProfileField::NotableFacts,
        ProfileField::RelationshipContext,
        ProfileField::ConversationTopics,
    ];

    /// 文档中的字段名
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileField::Name => "name",
            ProfileField::Nickname => "nickname",
            ProfileField::PreferredName => "preferred_name",
            ProfileField::PersonalityTraits => "personality_traits",
            ProfileField::Interests => "interests",
            ProfileField::NotableFacts => "notable_facts",
            ProfileField::RelationshipContext => "relationship_context",
            ProfileField::ConversationTopics => "conversation_topics",
        }
    }

    fn setter(self) -> Setter {
        match self {
            ProfileField::Name => |p, v| {
                p.name = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::Nickname => |p, v| {
                p.nickname = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::PreferredName => |p, v| {
                p.preferred_name = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::PersonalityTraits => |p, v| {
                p.personality_traits = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::Interests => |p, v| {
                p.interests = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::NotableFacts => |p, v| {
                p.notable_facts = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::RelationshipContext => |p, v| {
                p.relationship_context = serde_json::from_value(v)?;
                Ok(())
            },
            ProfileField::ConversationTopics => |p, v| {
                p.conversation_topics = serde_json::from_value(v)?;
                Ok(())
            },
        }
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileField {
    type Err = ProfileUpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_id" | "created_at" | "updated_at" => {
                Err(ProfileUpdateError::ReadOnlyField(s.to_string()))
            }
            _ => ProfileField::ALL
                .into_iter()
                .find(|f| f.as_str() == s)
                .ok_or_else(|| ProfileUpdateError::UnknownField(s.to_string())),
        }
    }
}

/// 画像字段更新错误
#[derive(Error, Debug)]
pub enum ProfileUpdateError {
    #[error("画像没有字段: {0}")]
    UnknownField(String),

    #[error("字段 {0} 只读")]
    ReadOnlyField(String),

    #[error("字段 {field} 的值无效: {source}")]
    InvalidValue {
        field: ProfileField,
        #[source]
        source: serde_json::Error,
    },
}

impl UserProfile {
    /// 创建新画像
    pub fn new(user_id: UserId) -> Self {
        Self::with_identity(Some(user_id))
    }

    fn with_identity(user_id: Option<UserId>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            name: None,
            nickname: None,
            preferred_name: None,
            personality_traits: Vec::new(),
            interests: Vec::new(),
            notable_facts: Vec::new(),
            relationship_context: Vec::new(),
            conversation_topics: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 按字段名更新
    ///
    /// 只接受 [`ProfileField`] 中列出的字段；成功后推进 `updated_at`。
    pub fn update_field(&mut self, field: &str, value: Value) -> Result<(), ProfileUpdateError> {
        let field: ProfileField = field.parse()?;
        self.set(field, value)
    }

    /// 按类型化字段更新
    pub fn set(&mut self, field: ProfileField, value: Value) -> Result<(), ProfileUpdateError> {
        (field.setter())(self, value)
            .map_err(|source| ProfileUpdateError::InvalidValue { field, source })?;
        self.touch();
        Ok(())
    }

    /// 推进更新时间
    pub fn touch(&mut self) {
        let now = Utc::now();
        // 保证单调，时钟回拨时也不倒退
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at
        };
    }

    /// 转换为存储文档
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// 从存储文档恢复
    ///
    /// 逐字段水合：未知字段被忽略，缺失或类型不符的字段保留构造默认值。
    pub fn from_document(doc: &Value) -> Self {
        let user_id = doc.get("user_id").and_then(Value::as_u64);
        let mut profile = Self::with_identity(user_id);

        let Some(map) = doc.as_object() else {
            tracing::warn!("Profile document is not an object, using defaults");
            return profile;
        };

        for field in ProfileField::ALL {
            if let Some(value) = map.get(field.as_str()) {
                if let Err(e) = (field.setter())(&mut profile, value.clone()) {
                    tracing::debug!("Ignoring profile field {}: {}", field, e);
                }
            }
        }

        if let Some(created_at) = map.get("created_at").and_then(parse_timestamp) {
            profile.created_at = created_at;
        }
        if let Some(updated_at) = map.get("updated_at").and_then(parse_timestamp) {
            profile.updated_at = updated_at;
        }

        profile
    }

    /// 当前应使用的称呼：preferred_name > nickname > name
    pub fn display_name(&self) -> Option<&str> {
        [&self.preferred_name, &self.nickname, &self.name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
    }

    /// 生成单行画像摘要
    pub fn render_summary(&self) -> String {
        let mut parts = Vec::new();

        if let Some(name) = self.display_name() {
            parts.push(format!("Name: {}", name));
        }
        if !self.personality_traits.is_empty() {
            parts.push(format!(
                "Personality: {}",
                head(&self.personality_traits, SUMMARY_TRAITS).join(", ")
            ));
        }
        if !self.interests.is_empty() {
            parts.push(format!(
                "Interests: {}",
                head(&self.interests, SUMMARY_INTERESTS).join(", ")
            ));
        }
        if !self.notable_facts.is_empty() {
            parts.push(format!(
                "Notable facts: {}",
                head(&self.notable_facts, SUMMARY_FACTS).join("; ")
            ));
        }
        if !self.relationship_context.is_empty() {
            parts.push(format!(
                "Relationship context: {}",
                head(&self.relationship_context, SUMMARY_RELATIONSHIP).join("; ")
            ));
        }

        parts.join(" | ")
    }
}

fn head(items: &[String], n: usize) -> &[String] {
    &items[..items.len().min(n)]
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
