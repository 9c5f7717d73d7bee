//! Recados notes server.
//!
//! Request flow:
//!
//! ```text
//! axum router → authenticate (bearer) → handler → use case → repository
//!                                                      ↘ NoteCache → CacheBackend
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod server;
pub mod usecases;

pub use cache::{CacheBackend, NoteCache, create_cache_backend};
pub use config::{AppConfig, CacheConfig, RedisConfig, ServerConfig, StorageBackend};
pub use error::{ApiError, Envelope};
pub use observability::init_tracing;
pub use server::{AppState, Readiness, RecadosServer, ServerBuilder, build_app};
