//! CasaLink offline sync.
//!
//! Captures landlord/tenant portal writes made without connectivity, persists
//! them locally, and replays them in order against the hosted document store
//! once the network returns.

pub mod api;
pub mod config;
pub mod models;
pub mod service;
pub mod status;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use service::{ServiceError, SyncService};
pub use status::{SyncSnapshot, SyncStatus};
pub use sync::{MutationOutcome, OutcomeTag};
