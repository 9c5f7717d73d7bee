//! Application use cases.
//!
//! Handlers stay thin: they parse the request, call one of these services
//! with the subject id attached by the auth middleware, and map the typed
//! error onto a response code.

pub mod login;
pub mod notes;
pub mod signup;

pub use login::{LoginError, LoginRequest, LoginService};
pub use notes::{NewNote, NoteError, NoteService};
pub use signup::{SignUpError, SignUpRequest, SignUpService, SignedUp};
