//! 核心数据模型模块
//!
//! 定义落盘文档对应的数据结构：情感档案、对话记录、用户画像、全局设置。

pub mod conversation;
pub mod emotion;
pub mod profile;
pub mod settings;

pub use conversation::*;
pub use emotion::*;
pub use profile::*;
pub use settings::*;

/// 用户 ID，文件名中以十进制表示
pub type UserId = u64;
