//! Infrastructure layer: the hosted data store client boundary.

pub mod remote_store;

pub use remote_store::{Collection, InMemoryRemoteStore, Mutation, MutationKind, RemoteError, RemoteStore};
