/// Embedded image metadata
///
/// This module handles:
/// - Walking PNG chunks for text entries (chunks.rs)
/// - Raw-byte recovery of keys the walk misses (scan.rs)
/// - Merging both into a MetadataBag (reader.rs)
/// - Interpreting the embedded node graph (graph.rs)
/// - Final / Intermediate / Unknown classification (classify.rs)
/// - Directory-wide analysis, filtering and comparison (analysis.rs)

pub mod analysis;
pub mod chunks;
pub mod classify;
pub mod graph;
pub mod reader;
pub mod scan;

pub use classify::{classify, Classification};
pub use reader::{read_metadata, MetadataBag};
