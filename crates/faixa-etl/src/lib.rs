//! Faixa ETL - corridor survey import pipeline
//!
//! Resolves the files of a dataset directory, stages their raw rows inside
//! the caller's transaction, normalizes them into the line, scenario,
//! structure and span records, and scores per-span risk for simulations.

pub mod normalize;
pub mod pipeline;
pub mod resolver;
pub mod simulation;
pub mod staging;

pub use normalize::{normalize, CrossingLayer, NormalizeOptions};
pub use pipeline::{preview_import, run_import, ImportOptions, ImportPreview, ImportReport};
pub use resolver::{resolve_dataset_dir, resolve_files};
pub use simulation::{score_spans, simulate, SimulationReport, SimulationRequest, SpanScore};
pub use staging::stage;
