//! Client for the external video catalog store.
//!
//! The queue core only depends on the [`VideoStore`] contract: an
//! idempotent insert-or-update of one record by its identifier.

pub mod client;
pub mod error;

pub use client::{HttpVideoStore, StoreConfig, VideoStore};
pub use error::{StoreError, StoreResult};
