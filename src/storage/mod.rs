//! 存储层模块
//!
//! 以 JSON 文件保存每个用户的状态，一个文件族对应一类文档。

pub mod codec;
pub mod layout;
pub mod migrations;
pub mod repository;

pub use layout::{FileFamily, StorePaths};
pub use repository::{FamilyCounts, JsonStateRepository, LoadReport, SaveReport, StateRepository};
