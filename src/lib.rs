//! Starter Kit
//!
//! Keeps a sourdough starter, its feedings and check-ins in a schema-less
//! cloud record store.

pub mod client;
pub mod config;
pub mod logging;
pub mod models;
pub mod record;
pub mod store;

pub use client::{ClientError, Operation, OperationHandle, OperationState, StoreClient};
pub use config::{ClientConfig, ConfigError};
pub use logging::LoggingError;
pub use models::{
    merge_by_date, FlourRation, Image, Mass, MassUnit, Starter, StarterCheckIn, StarterMeal,
    Temperature, TemperatureUnit, TimelineEntry, WaterRation,
};
pub use record::{ConcurrencyToken, DecodeError, GenericRecord, OwnerRef, RecordCodec, RecordId};
pub use store::{MemoryStore, Query, RecordStore, StoreError};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
