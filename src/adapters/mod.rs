//! Adapters implementing the ports in `crate::ports`.

pub mod audit;
pub mod gateway_client;
pub mod in_memory;
pub mod postgres_ledger;

pub use audit::PostgresAuditLogger;
pub use gateway_client::HttpChallengeCompleter;
pub use in_memory::{InMemoryAuditLog, InMemoryLedger};
pub use postgres_ledger::PostgresLedger;
