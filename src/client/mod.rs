//! Store client for a sourdough starter's records.
//!
//! This module provides:
//! - [`StoreClient`]: typed operations over a [`RecordStore`](crate::store::RecordStore)
//! - [`Operation`]: cancellable, awaitable handles that can be ordered after each other
//! - [`ClientError`]: what a failed operation reports

#[allow(clippy::module_inception)]
mod client;
mod error;
mod join;
mod operation;


pub use client::StoreClient;
pub use error::ClientError;
pub use join::{join2_with, join3_with};
pub use operation::{Operation, OperationHandle, OperationState};
