//! Ledger persistence: entities, the `LedgerStore` seam and its stores.

pub mod error;
pub mod host_repository;
pub mod ledger;
pub mod memory;
pub mod order_repository;
#[cfg(feature = "database")]
pub mod pool;
#[cfg(feature = "database")]
pub mod postgres;
pub mod transaction_data;
pub mod transaction_repository;

pub use ledger::{LedgerStore, SharedLedgerStore};
pub use memory::InMemoryLedgerStore;
#[cfg(feature = "database")]
pub use postgres::PgLedgerStore;
