//! Backup Engine Library
//!
//! Background synchronization of wallet state categories to an encrypted
//! remote backup server, plus full-state restore.

pub mod config;
pub mod domain;
pub mod engine;
pub mod identity;
pub mod notify;
pub mod registry;
pub mod restore;
pub mod scheduler;
pub mod state;
pub mod tracker;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use domain::{DomainEvent, DomainStateHandle};
pub use engine::BackupEngine;
pub use registry::{BackupCategory, Network};
pub use utils::errors::EngineError;
pub type Result<T> = std::result::Result<T, EngineError>;
