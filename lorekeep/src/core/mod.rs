//! Core engine wiring extraction, resolution, validation and storage together.

pub mod engine;

pub use engine::{IngestReport, KnowledgeEngine};
