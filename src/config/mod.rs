//! Configuration models for the store backend and lock timeouts.

pub mod allocation;

pub use allocation::{AllocationConfig, StoreBackendConfig};
