/// Shared data structures for the sync engine
///
/// These structs represent the data model that flows between the catalog layer,
/// the reconciliation engine and whatever presents the results.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One row of a catalog table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    /// Table the row was read from
    pub table: String,
    /// SQLite rowid, stable for the duration of one engine call
    pub row_id: i64,
    /// Raw value of the image column (file name or relative path)
    pub image_ref: Option<String>,
    /// Every other column, as loosely typed JSON
    pub columns: BTreeMap<String, serde_json::Value>,
}

impl CatalogRecord {
    /// File name part of a non-empty image reference
    pub fn image_name(&self) -> Option<&str> {
        self.image_ref
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(base_name)
    }
}

/// Last path component, accepting both separator styles
pub fn base_name(reference: &str) -> &str {
    reference.rsplit(['/', '\\']).next().unwrap_or(reference)
}

/// A recognized image file directly inside the output directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FileSystemEntry {
    pub file_name: String,
    pub path: PathBuf,
}

/// A catalog row referenced by a correction set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRef {
    pub table: String,
    pub row_id: i64,
    pub image_path: String,
}

/// An image on disk without any catalog row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingEntry {
    pub file_name: String,
    pub image_path: PathBuf,
}

/// An image on disk without its derived thumbnail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingThumbnail {
    pub file_name: String,
    pub image_path: PathBuf,
    pub thumbnail_path: PathBuf,
}

/// The four-way diff between catalog and output directory
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrectionSet {
    /// Rows whose image is not among the listed files (for display)
    pub missing_images: Vec<CatalogRef>,
    /// Rows whose image definitely does not exist (safe to delete)
    pub removed_entries: Vec<CatalogRef>,
    /// Files no row references
    pub missing_entries: Vec<MissingEntry>,
    /// Files without a thumbnail; filled by the separate thumbnail pass
    pub missing_thumbnails: Vec<MissingThumbnail>,
}

impl CorrectionSet {
    pub fn is_clean(&self) -> bool {
        self.missing_images.is_empty()
            && self.removed_entries.is_empty()
            && self.missing_entries.is_empty()
            && self.missing_thumbnails.is_empty()
    }
}

/// Summary returned by every mutation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome<C> {
    pub success: bool,
    pub message: String,
    pub counts: C,
}

impl<C: Default> MutationOutcome<C> {
    /// Nothing to do: reported as unsuccessful, never as an error
    pub fn nothing_to_do(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            counts: C::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreEntriesCounts {
    pub restored: usize,
    pub skipped_intermediate: usize,
    pub skipped_unknown: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoveEntriesCounts {
    pub removed: usize,
    pub tables: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailCounts {
    pub created: usize,
    pub existing: usize,
    pub errors: usize,
}
