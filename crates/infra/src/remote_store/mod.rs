//! Hosted data store boundary.
//!
//! This module defines the collection-level client the sync engine talks to,
//! without making any assumption about the hosting service behind it.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryRemoteStore, Mutation, MutationKind};
pub use r#trait::{Collection, RemoteError, RemoteStore};
