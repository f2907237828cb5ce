//! askdoc core library
//!
//! Foundational utilities shared by every askdoc crate:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, CliOverrides, ScrapeTrigger};
pub use error::{AppError, AppResult};
pub use logging::{init_logging, LogFormat};
