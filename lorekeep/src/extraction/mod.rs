//! Entity and relationship extraction.
//!
//! Extractors implement [`Extractor`] and are combined by [`CompositeExtractor`],
//! which runs them concurrently, merges overlapping proposals, runs a second
//! relation phase over the merged entities, and rescales confidences.
//!
//! # Example
//!
//! ```rust
//! use lorekeep::extraction::{Extractor, GazetteerExtractor};
//! use std::collections::BTreeMap;
//!
//! # async fn example() -> lorekeep::Result<()> {
//! let mut patterns = BTreeMap::new();
//! patterns.insert("Technology".to_string(), vec!["Python".to_string()]);
//! let extractor = GazetteerExtractor::new("gazetteer", &patterns)?;
//!
//! let collection = extractor.extract("Omar uses Python daily", "turn-1").await?;
//! assert_eq!(collection.entities()[0].name, "Python");
//! # Ok(())
//! # }
//! ```

pub mod composite;
pub mod gazetteer;
pub mod model;
pub mod text;
pub mod traits;

pub use composite::{CompositeExtractor, ConfiguredExtractor};
pub use gazetteer::GazetteerExtractor;
pub use model::{ModelExtractor, default_label_map};
pub use traits::{DependencyTriple, Extractor, NlpModel, SpanPrediction};

#[cfg(test)]
pub use traits::MockNlpModel;
