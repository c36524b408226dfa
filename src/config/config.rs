use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 存储目录配置
///
/// 未设置的子路径从 `data_dir` 推导，见 [`StorageConfig::resolved`]。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 数据根目录
    pub data_dir: PathBuf,
    /// 情感档案目录（情感、记忆、事件、里程碑）
    pub profiles_dir: Option<PathBuf>,
    /// 用户画像目录
    pub user_profiles_dir: Option<PathBuf>,
    /// 对话记录目录
    pub conversations_dir: Option<PathBuf>,
    /// 私信许可设置文件
    pub dm_settings_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            profiles_dir: None,
            user_profiles_dir: None,
            conversations_dir: None,
            dm_settings_file: None,
        }
    }
}

impl StorageConfig {
    /// 以指定根目录创建配置，子路径全部使用默认布局
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// 填充所有未设置的子路径
    pub fn resolved(&self) -> ResolvedStorageConfig {
        let data_dir = self.data_dir.clone();
        ResolvedStorageConfig {
            profiles_dir: self
                .profiles_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("profiles")),
            user_profiles_dir: self
                .user_profiles_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("user_profiles")),
            conversations_dir: self
                .conversations_dir
                .clone()
                .unwrap_or_else(|| data_dir.join("conversations")),
            dm_settings_file: self
                .dm_settings_file
                .clone()
                .unwrap_or_else(|| data_dir.join("dm_settings.json")),
            data_dir,
        }
    }
}

/// 子路径全部确定后的存储配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStorageConfig {
    pub data_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub user_profiles_dir: PathBuf,
    pub conversations_dir: PathBuf,
    pub dm_settings_file: PathBuf,
}

/// 对话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// 每个用户保留的最近消息数
    pub max_history: usize,
    /// 格式化历史时机器人一方的显示名
    pub bot_label: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            bot_label: "Bot".into(),
        }
    }
}

/// 自动保存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// 是否启用周期保存
    pub enabled: bool,
    /// 保存间隔（秒）
    pub interval_secs: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 存储配置
    pub storage: StorageConfig,
    /// 对话配置
    pub conversation: ConversationConfig,
    /// 自动保存配置
    pub autosave: AutosaveConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".into();
        config.autosave.interval_secs = 60;
        config
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config
    }
}
