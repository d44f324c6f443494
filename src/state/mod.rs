/// State management module
///
/// This module handles all catalog-facing state, including:
/// - Database connections and queries (library.rs)
/// - Shared data structures (data.rs)

pub mod library;
pub mod data;
