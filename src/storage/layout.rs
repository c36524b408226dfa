//! 目录布局与文件名映射

use crate::config::config::{ResolvedStorageConfig, StorageConfig};
use crate::error::{AppError, Result};
use crate::models::UserId;
use std::path::{Path, PathBuf};

/// 文件名中用户 ID 与后缀之间的分隔符
pub const SEPARATOR: char = '_';

/// 写入探测文件名
pub const WRITE_PROBE: &str = "write_test.tmp";

/// 文件族：共享目录和文件名模式的一类文档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFamily {
    /// `<id>.json`
    Emotional,
    /// `<id>_memories.json`
    Memories,
    /// `<id>_events.json`
    Events,
    /// `<id>_milestones.json`
    Milestones,
    /// `<id>_profile.json`
    UserProfile,
    /// `<id>_conversations.json`
    Conversations,
    /// `<id>_summary.json`
    Summary,
}

impl FileFamily {
    pub const ALL: [FileFamily; 7] = [
        FileFamily::Emotional,
        FileFamily::Memories,
        FileFamily::Events,
        FileFamily::Milestones,
        FileFamily::UserProfile,
        FileFamily::Conversations,
        FileFamily::Summary,
    ];

    /// 文件名后缀（不含分隔符），复合情感文档没有后缀
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            FileFamily::Emotional => None,
            FileFamily::Memories => Some("memories"),
            FileFamily::Events => Some("events"),
            FileFamily::Milestones => Some("milestones"),
            FileFamily::UserProfile => Some("profile"),
            FileFamily::Conversations => Some("conversations"),
            FileFamily::Summary => Some("summary"),
        }
    }

    /// 日志中使用的名称
    pub fn label(self) -> &'static str {
        self.suffix().unwrap_or("emotional")
    }

    /// 该族用户的文件名
    pub fn file_name(self, user_id: UserId) -> String {
        match self.suffix() {
            Some(suffix) => format!("{}{}{}.json", user_id, SEPARATOR, suffix),
            None => format!("{}.json", user_id),
        }
    }

    /// 判断文件名是否属于该族
    ///
    /// 返回 `None` 表示不属于；`Some(Err)` 表示属于但无法解析出用户 ID。
    pub fn match_file_name(self, file_name: &str) -> Option<Result<UserId>> {
        let stem = file_name.strip_suffix(".json")?;
        let key = match self.suffix() {
            None if stem.contains(SEPARATOR) => return None,
            None => stem,
            Some(suffix) => {
                let prefix = stem.strip_suffix(suffix)?.strip_suffix(SEPARATOR)?;
                prefix.split(SEPARATOR).next().unwrap_or(prefix)
            }
        };
        Some(parse_user_id(key))
    }
}

fn parse_user_id(key: &str) -> Result<UserId> {
    key.parse()
        .map_err(|_| AppError::InvalidUserId(key.to_string()))
}

/// 存储路径集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub data_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub user_profiles_dir: PathBuf,
    pub conversations_dir: PathBuf,
    pub dm_settings_file: PathBuf,
}

impl From<ResolvedStorageConfig> for StorePaths {
    fn from(config: ResolvedStorageConfig) -> Self {
        Self {
            data_dir: config.data_dir,
            profiles_dir: config.profiles_dir,
            user_profiles_dir: config.user_profiles_dir,
            conversations_dir: config.conversations_dir,
            dm_settings_file: config.dm_settings_file,
        }
    }
}

impl From<&StorageConfig> for StorePaths {
    fn from(config: &StorageConfig) -> Self {
        config.resolved().into()
    }
}

impl StorePaths {
    /// 以根目录的默认布局创建
    pub fn under(data_dir: impl Into<PathBuf>) -> Self {
        StorageConfig::with_data_dir(data_dir).resolved().into()
    }

    /// 文件族所在目录
    pub fn family_dir(&self, family: FileFamily) -> &Path {
        match family {
            FileFamily::Emotional
            | FileFamily::Memories
            | FileFamily::Events
            | FileFamily::Milestones => &self.profiles_dir,
            FileFamily::UserProfile => &self.user_profiles_dir,
            FileFamily::Conversations | FileFamily::Summary => &self.conversations_dir,
        }
    }

    /// 某用户在某文件族中的文件路径
    pub fn family_path(&self, family: FileFamily, user_id: UserId) -> PathBuf {
        self.family_dir(family).join(family.file_name(user_id))
    }

    /// 需要存在的全部目录
    pub fn directories(&self) -> Vec<&Path> {
        let mut dirs = vec![
            self.data_dir.as_path(),
            self.profiles_dir.as_path(),
            self.user_profiles_dir.as_path(),
            self.conversations_dir.as_path(),
        ];
        if let Some(parent) = self.dm_settings_file.parent() {
            if !parent.as_os_str().is_empty() && !dirs.contains(&parent) {
                dirs.push(parent);
            }
        }
        dirs
    }
}
