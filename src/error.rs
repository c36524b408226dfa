//! 错误处理模块
//!
//! 定义存储层的错误类型。除 `Unavailable` 外，所有错误都只影响单个文件。

use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 存储不可用（目录无法创建或不可写），整个加载/保存过程中止
    #[error("存储不可用: {0}")]
    Unavailable(String),

    /// IO 错误
    #[error("IO 错误 ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 文档内容存在但无法解析
    #[error("文档格式错误 ({}): {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 文件名无法解析为用户 ID
    #[error("无效的用户 ID: {0}")]
    InvalidUserId(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),
}

impl AppError {
    /// 构造带路径的 IO 错误
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// 是否为致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Unavailable(_))
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::Config(e.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
