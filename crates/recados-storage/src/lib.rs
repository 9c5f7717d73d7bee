//! Storage abstraction layer for the Recados server.
//!
//! The use cases never talk to a concrete backend. They receive trait objects
//! implementing the ports defined here:
//!
//! - [`IdentityRepository`] - registered users
//! - [`NoteRepository`] - notes, always addressed together with their owner
//! - [`CacheStore`] - byte-oriented key/value cache plus the `refreshing` flag
//!
//! Production implementations live in `recados-db-postgres` and the server's
//! cache backend; in-memory doubles live in `recados-db-memory`.

pub mod error;
pub mod traits;

pub use error::{CacheError, StorageError};
pub use traits::{CacheStore, IdentityRepository, NoteRepository};

/// Shareable identity repository.
pub type DynIdentityRepository = std::sync::Arc<dyn IdentityRepository>;

/// Shareable note repository.
pub type DynNoteRepository = std::sync::Arc<dyn NoteRepository>;

/// Shareable cache store.
pub type DynCacheStore = std::sync::Arc<dyn CacheStore>;
