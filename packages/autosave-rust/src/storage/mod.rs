//! Two-tier storage for grading drafts.
//!
//! - **Tier 1** ([`FastCache`]): synchronous key-value store of serialized
//!   strings. Cheap, capacity-bounded, usable from teardown paths.
//! - **Tier 2** ([`DurableStore`]): asynchronous, transactional,
//!   schema-versioned object store. Opened through a [`DurableConnection`].
//!
//! Both tiers report failures as [`StorageError`]. The
//! [`StorageCoordinator`](crate::coordinator::StorageCoordinator) sits on
//! top and presents them as one read/write contract.

pub mod datastores;
pub mod durable_store;
pub mod engines;
pub mod error;
pub mod fast_cache;

pub use durable_store::*;
pub use error::*;
pub use fast_cache::*;
