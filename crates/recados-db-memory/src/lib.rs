//! In-memory backends for the Recados storage ports.
//!
//! These implementations back the `memory` storage mode and serve as test
//! doubles for the use cases. All of them are `Send + Sync` and use
//! `DashMap` for concurrent access without a global lock.
//!
//! # Example
//!
//! ```ignore
//! use recados_db_memory::{InMemoryNoteRepository, MemoryCache};
//!
//! let notes = InMemoryNoteRepository::new();
//! let cache = MemoryCache::new();
//! cache.fail_deletes(true); // simulate an unreachable cache
//! ```

pub mod cache;
pub mod identity;
pub mod note;

pub use cache::MemoryCache;
pub use identity::InMemoryIdentityRepository;
pub use note::InMemoryNoteRepository;

// Re-export the ports for convenience
pub use recados_storage::{CacheError, CacheStore, IdentityRepository, NoteRepository, StorageError};
