//! `shopsync-auth`: authentication collaborator boundary.
//!
//! This crate is intentionally decoupled from storage; role lookup against the
//! users collection happens in the offline crate's session gate.

pub mod in_memory;
pub mod provider;
pub mod roles;
pub mod session;

pub use in_memory::InMemoryAuthProvider;
pub use provider::{AuthError, AuthProvider};
pub use roles::Role;
pub use session::{AuthEvent, AuthorizedUser, Credentials, Identity, Session};
