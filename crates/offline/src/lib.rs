//! `shopsync-offline`
//!
//! **Responsibility:** offline-first sync engine for the shop dashboards.
//!
//! This crate provides:
//! - Local cache of whole collections (SQLite)
//! - Connectivity monitor driven by environment notifications
//! - Pending action queue, replayed in order on reconnect
//! - Sync engine: optimistic mutation, then remote application and refetch
//!
//! The hosted data store stays the authority; local state is overwritten by
//! every successful refetch.

pub mod actions;
pub mod cache;
pub mod collections;
pub mod command;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod engine;
pub mod error;
pub mod queue;
pub mod session;
pub mod types;
pub mod worker;

pub use actions::{PendingAction, SalePayload, StepFailure, TransactionPayload};
pub use cache::{CacheError, CacheKey, LocalCache};
pub use collections::{
    Collections, LOW_STOCK_THRESHOLD, OperatorStats, PHONE_PLAN_CATEGORY, ProductSalesStats, SalesTotals,
};
pub use command::Command;
pub use config::{CacheLocation, SyncConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, OfflineError};
pub use context::{AppContext, Dashboard};
pub use engine::SyncEngine;
pub use error::EngineError;
pub use queue::{ActionStatus, PendingQueue, QueuedAction};
pub use session::SessionGate;
pub use types::{
    DashboardScope, EngineState, FailedAction, ReplayReport, SubmitOutcome, SyncEvent,
};
pub use worker::{ReconnectHandle, ReconnectWorker};
