//! Faixa Core - Domain models, configuration, and survey file readers
//!
//! This crate contains the domain model of a transmission corridor survey
//! (lines, scenarios, structures, spans, vegetation and risk records), the
//! layered configuration, the field-alias resolution used for loosely named
//! survey columns, and the CSV/KML parsers.

pub mod config;
pub mod error;
pub mod fields;
pub mod formats;
pub mod models;

pub use error::{FaixaError, Result};
