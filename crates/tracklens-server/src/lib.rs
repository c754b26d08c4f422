pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AppConfig, LoggingConfig, ServerConfig, StorageConfig};
pub use observability::init_tracing;
pub use server::{AppState, ServerBuilder, TracklensServer, build_app};
