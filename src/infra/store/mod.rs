//! Store backends.

pub mod locks;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use locks::{SlotGuard, SlotLockRegistry};
pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;
