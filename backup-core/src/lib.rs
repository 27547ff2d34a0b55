pub mod config;
pub mod constants;
pub mod api_config;
pub mod error;
pub mod token_store;
pub mod drive;
pub mod archive;
pub mod history;
pub mod notify;
pub mod pipeline;
pub mod scheduler;
pub mod service;

pub use error::{BackupError, Result};
pub use service::BackupService;
