//! Infrastructure adapters for storage backends.

pub mod store;

pub use store::InMemoryStore;
#[cfg(feature = "postgres")]
pub use store::PostgresStore;
