//! Dispatcher handlers: schema, group uploads, retry callbacks, commands.

pub mod callbacks;
pub mod commands;
pub mod schema;
pub mod types;
pub mod uploads;

pub use schema::schema;
pub use types::{HandlerDeps, HandlerError};
