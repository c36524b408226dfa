//! Hearth - 对话机器人的用户状态存储
//!
//! 把每个用户的情感档案、记忆、事件、里程碑、画像、对话历史和摘要保存为 JSON
//! 文件，启动时整体加载到内存，运行期间定时写回。

pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod services;
pub mod state;
pub mod storage;
