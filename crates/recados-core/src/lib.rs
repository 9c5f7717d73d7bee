//! Core domain types shared by every Recados crate.
//!
//! - [`model`] - identities, notes and the change sets applied to them
//! - [`code`] - the response-code vocabulary exposed over the API
//! - [`id`] - note uid generation

pub mod code;
pub mod id;
pub mod model;

pub use code::ResponseCode;
pub use id::{IdError, generate_uid, validate_uid};
pub use model::{
    Identity, IdentityDraft, MAX_NAME_LENGTH, MAX_PASSWORD_LENGTH, Note, NoteChanges, NoteDraft,
};
