//! 全局设置文档

use super::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 私信许可设置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DmSettings {
    /// 允许私信的用户，落盘时按升序排列
    #[serde(default)]
    pub enabled_users: Vec<UserId>,
}

impl DmSettings {
    pub fn from_set(users: &HashSet<UserId>) -> Self {
        let mut enabled_users: Vec<_> = users.iter().copied().collect();
        enabled_users.sort_unstable();
        Self { enabled_users }
    }

    pub fn into_set(self) -> HashSet<UserId> {
        self.enabled_users.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_set_is_sorted() {
        let users: HashSet<UserId> = [9, 7, 120].into_iter().collect();
        assert_eq!(DmSettings::from_set(&users).enabled_users, vec![7, 9, 120]);
    }

    #[test]
    fn test_missing_key_is_empty() {
        let settings: DmSettings = serde_json::from_str("{}").unwrap();
        assert!(settings.into_set().is_empty());
    }
}
