//! Remote store access for the sync layer.
//!
//! Provides the HTTP client with auth header injection, the `RemoteStore`
//! write interface, and the connectivity/domain error taxonomy.

pub mod client;
pub mod error;
pub mod store;
pub mod types;

pub use client::ApiClient;
pub use error::RemoteError;
pub use store::{HttpRemoteStore, RemoteStore};
