//! 服务模块

pub mod persistence;

pub use persistence::{PersistenceService, create_persistence_service};
