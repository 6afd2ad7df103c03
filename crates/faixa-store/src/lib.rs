//! Faixa Store - Storage ports and adapters
//!
//! This crate defines the unit-of-work port that staging and normalization
//! write through, a read-only port for risk queries, and two adapters: an
//! in-memory store for tests and dry runs, and a PostgreSQL/PostGIS store.

pub mod memory;
pub mod ports;
pub mod postgres;

pub use memory::{MemoryStore, MemoryTransaction};
pub use ports::{ImportStore, ImportTransaction, RiskReader};
pub use postgres::{PostgresConfig, PostgresStore, PostgresTransaction};
