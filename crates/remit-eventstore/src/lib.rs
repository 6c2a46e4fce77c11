pub mod memory;
pub mod postgres;

pub use memory::{AuditLog, InMemoryInstrumentStore, InMemoryObligationDirectory};
pub use postgres::{PgInstrumentStore, PgObligationDirectory, apply_schema};
