//! Ledger and reference data stores

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryReferenceStore, InMemoryTransactionStore};
pub use postgres::{PgReferenceStore, PgTransactionStore};
