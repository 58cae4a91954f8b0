//! Storage abstractions and implementations
//!
//! The engine reads the knowledge graph through [`GraphView`] and writes through
//! [`GraphStore`]. [`InMemoryGraphStore`] is the reference implementation; any
//! persistence engine can sit behind the same traits.

pub mod errors;
pub mod memory;
pub mod traits;

pub use errors::{StorageError, StorageResult};
pub use memory::InMemoryGraphStore;
pub use traits::{CommitSummary, GraphStats, GraphStore, GraphView};
