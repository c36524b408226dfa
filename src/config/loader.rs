use crate::config::config::AppConfig;
use crate::error::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::PathBuf;

/// 环境变量前缀，嵌套字段以 `__` 分隔，如 `HEARTH_STORAGE__DATA_DIR`
const ENV_PREFIX: &str = "HEARTH_";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 搜索路径：
    /// 1. 内置默认值
    /// 2. ./hearth.toml
    /// 3. 环境变量
    pub fn load() -> Result<AppConfig> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: PathBuf) -> Result<AppConfig> {
        Ok(Self::figment(path).extract()?)
    }

    fn figment(path: PathBuf) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> std::result::Result<(), ConfigValidationError> {
        if config.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigValidationError::MissingDataDir);
        }

        if config.conversation.max_history == 0 {
            return Err(ConfigValidationError::InvalidHistoryBound);
        }

        if config.autosave.enabled && config.autosave.interval_secs == 0 {
            return Err(ConfigValidationError::InvalidAutosaveInterval);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug)]
pub enum ConfigValidationError {
    #[error("数据目录未配置")]
    MissingDataDir,

    #[error("对话历史上限无效，必须大于 0")]
    InvalidHistoryBound,

    #[error("自动保存间隔无效，必须大于 0")]
    InvalidAutosaveInterval,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    PathBuf::from("hearth.toml")
}
