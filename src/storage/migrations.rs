//! 情感记录迁移
//!
//! 解码之后、放入容器之前，对每条情感记录按版本顺序执行修补步骤。
//! 每个步骤都是幂等的，记录已满足要求时不做任何改动。

use crate::models::EmotionMap;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// 单个迁移步骤
pub struct Migration {
    /// 版本号，按升序执行
    pub version: u32,
    /// 名称
    pub name: &'static str,
    /// 执行修补，返回是否修改了记录
    pub apply: fn(&mut EmotionMap, DateTime<Utc>) -> bool,
}

/// 全部迁移步骤
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "backfill_first_interaction",
    apply: backfill_first_interaction,
}];

/// 对一条记录执行全部迁移，返回是否有修改
pub fn migrate_record(record: &mut EmotionMap, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for migration in MIGRATIONS {
        if (migration.apply)(record, now) {
            tracing::trace!("Applied migration v{} {}", migration.version, migration.name);
            changed = true;
        }
    }
    changed
}

/// 缺少 `first_interaction` 时用 `last_interaction` 或当前时间补上
fn backfill_first_interaction(record: &mut EmotionMap, now: DateTime<Utc>) -> bool {
    if record.contains_key("first_interaction") {
        return false;
    }
    let value = record
        .get("last_interaction")
        .cloned()
        .unwrap_or_else(|| Value::String(now.to_rfc3339()));
    record.insert("first_interaction".into(), value);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> EmotionMap {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_backfill_from_last_interaction() {
        let mut r = record(json!({"last_interaction": "2024-05-01T10:00:00+00:00"}));
        assert!(migrate_record(&mut r, Utc::now()));
        assert_eq!(r["first_interaction"], "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_backfill_from_now() {
        let now = Utc::now();
        let mut r = record(json!({"mood": "happy"}));
        assert!(migrate_record(&mut r, now));
        assert_eq!(r["first_interaction"], Value::String(now.to_rfc3339()));
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut r = record(json!({"first_interaction": "2023-01-01T00:00:00+00:00"}));
        let before = r.clone();
        assert!(!migrate_record(&mut r, Utc::now()));
        assert_eq!(r, before);
    }

    #[test]
    fn test_versions_are_ascending() {
        let versions: Vec<_> = MIGRATIONS.iter().map(|m| m.version).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
        assert_eq!(versions, vec![1]);
    }
}
