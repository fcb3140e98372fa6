//! Core infrastructure: configuration, errors, logging, retry policy.

pub mod config;
pub mod error;
pub mod logging;
pub mod retry;

pub use error::{AppError, AppResult};
pub use logging::init_logger;
