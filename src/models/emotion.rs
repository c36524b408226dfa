//! 情感档案数据模型
//!
//! 磁盘上的情感档案是一个复合文档：自由格式的情感字段，加上内嵌的
//! `relationship` 与 `interaction_stats` 两个子文档。内存中三者分别存放。

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// 自由格式的情感字段
pub type EmotionMap = Map<String, Value>;

/// 关系进展（自由格式）
pub type Relationship = Map<String, Value>;

/// 各类互动的计数
pub type InteractionStats = BTreeMap<String, i64>;

/// 复合文档中关系子文档的键
pub const RELATIONSHIP_KEY: &str = "relationship";
/// 复合文档中互动统计子文档的键
pub const INTERACTION_STATS_KEY: &str = "interaction_stats";

/// 情感档案的磁盘表示
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionalDocument {
    /// 除子文档外的全部情感字段
    #[serde(flatten)]
    pub emotions: EmotionMap,

    /// 关系进展，缺失或不是对象时为空
    #[serde(default, deserialize_with = "relationship_or_empty")]
    pub relationship: Relationship,

    /// 互动统计，只保留整数计数
    #[serde(default, deserialize_with = "stats_or_empty")]
    pub interaction_stats: InteractionStats,
}

fn relationship_or_empty<'de, D>(deserializer: D) -> Result<Relationship, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Relationship::new()),
        other => {
            warn!("Ignoring non-object {}: {}", RELATIONSHIP_KEY, other);
            Ok(Relationship::new())
        }
    }
}

fn stats_or_empty<'de, D>(deserializer: D) -> Result<InteractionStats, D::Error>
where
    D: Deserializer<'de>,
{
    let map = match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        Value::Null => return Ok(InteractionStats::new()),
        other => {
            warn!("Ignoring non-object {}: {}", INTERACTION_STATS_KEY, other);
            return Ok(InteractionStats::new());
        }
    };

    let mut stats = InteractionStats::new();
    for (kind, count) in map {
        match count.as_i64() {
            Some(count) => {
                stats.insert(kind, count);
            }
            None => warn!("Ignoring non-integer count for {}: {}", kind, count),
        }
    }
    Ok(stats)
}

impl EmotionalDocument {
    /// 由内存中的三部分组合成复合文档
    ///
    /// 情感字段中若混入了子文档键，以独立容器中的值为准。
    pub fn compose(
        emotions: &EmotionMap,
        relationship: Option<&Relationship>,
        interaction_stats: Option<&InteractionStats>,
    ) -> Self {
        let mut emotions = emotions.clone();
        emotions.remove(RELATIONSHIP_KEY);
        emotions.remove(INTERACTION_STATS_KEY);

        Self {
            emotions,
            relationship: relationship.cloned().unwrap_or_default(),
            interaction_stats: interaction_stats.cloned().unwrap_or_default(),
        }
    }

    /// 拆分为情感字段、关系进展、互动统计
    pub fn into_parts(self) -> (EmotionMap, Relationship, InteractionStats) {
        (self.emotions, self.relationship, self.interaction_stats)
    }
}
