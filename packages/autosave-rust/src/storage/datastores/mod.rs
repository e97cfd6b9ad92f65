//! [`DurableStore`](super::DurableStore) implementations.
//!
//! [`MemoryDurableStore`] is always available; [`RedbDurableStore`] needs
//! the `redb` feature (on by default).

mod memory;
#[cfg(feature = "redb")]
mod redb;

pub use memory::MemoryDurableStore;
#[cfg(feature = "redb")]
pub use self::redb::{RedbDurableStore, DURABLE_SCHEMA_VERSION};
