/// Catalog / output directory synchronization
///
/// This module handles:
/// - The per-call request context and its validation (this file)
/// - Computing correction sets (reconcile.rs)
/// - Applying them: restore rows, remove rows, restore thumbnails (mutations.rs)
/// - Bounded fan-out for file work (pool.rs)
///
/// A `Session` holds no connection. Every call opens the catalog, uses it and drops it,
/// and nothing is cached between calls.

pub mod mutations;
pub mod pool;
pub mod reconcile;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::state::data::{CatalogRecord, CorrectionSet, FileSystemEntry, MissingThumbnail};
use crate::state::library::Catalog;

/// Everything one engine call needs to know about where to look
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// SQLite catalog file
    pub catalog_path: PathBuf,
    /// Directory holding the generated images
    pub output_dir: PathBuf,
    /// Column holding the image file name or relative path
    pub image_column: String,
    /// Tables to check, in order
    pub tables: Vec<String>,
}

impl SyncRequest {
    /// Reject missing or empty parameters before any work is attempted
    pub fn validate(&self) -> SyncResult<()> {
        let mut missing = Vec::new();
        if self.catalog_path.as_os_str().is_empty() {
            missing.push("catalog path");
        }
        if self.output_dir.as_os_str().is_empty() {
            missing.push("output directory");
        }
        if self.image_column.trim().is_empty() {
            missing.push("image column");
        }
        if self.tables.is_empty() || self.tables.iter().any(|t| t.trim().is_empty()) {
            missing.push("table names");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Validation(format!(
                "missing parameters: {}",
                missing.join(", ")
            )))
        }
    }
}

/// A validated request plus the engine configuration
#[derive(Debug, Clone)]
pub struct Session {
    request: SyncRequest,
    config: SyncConfig,
}

impl Session {
    pub fn new(request: SyncRequest, config: SyncConfig) -> SyncResult<Self> {
        request.validate()?;
        Ok(Session { request, config })
    }

    pub fn request(&self) -> &SyncRequest {
        &self.request
    }

    fn open_catalog(&self) -> SyncResult<Catalog> {
        Ok(Catalog::open(&self.request.catalog_path)?)
    }

    /// Recognized image files in the output directory
    pub fn list_entries(&self) -> SyncResult<Vec<FileSystemEntry>> {
        Ok(reconcile::list_image_entries(&self.request.output_dir)?)
    }

    /// Rows of every requested table that exists and has the image column
    fn load_records(&self, catalog: &Catalog) -> SyncResult<Vec<CatalogRecord>> {
        let mut records = Vec::new();

        for table in &self.request.tables {
            let columns = catalog.table_columns(table)?;
            if columns.is_empty() {
                warn!("Table {} does not exist, skipping", table);
                continue;
            }
            if !columns.contains(&self.request.image_column) {
                warn!(
                    "Table {} has no column {}, skipping",
                    table, self.request.image_column
                );
                continue;
            }

            records.extend(catalog.list_rows(table, &self.request.image_column)?);
        }

        Ok(records)
    }

    /// Missing images, removed entries and missing entries.
    ///
    /// Has no side effects, so two calls without an intervening change agree.
    pub fn reconcile(&self) -> SyncResult<CorrectionSet> {
        let entries = self.list_entries()?;
        let records = {
            let catalog = self.open_catalog()?;
            self.load_records(&catalog)?
        };

        let set = reconcile::reconcile(&records, &entries, &self.request.output_dir);

        info!(
            "🔍 Checked {} rows against {} files: {} missing images, {} removable rows, {} uncataloged files",
            records.len(),
            entries.len(),
            set.missing_images.len(),
            set.removed_entries.len(),
            set.missing_entries.len()
        );

        Ok(set)
    }

    /// The thumbnail pass. Creates the thumbnail directory if it is absent.
    pub fn check_thumbnails(&self) -> SyncResult<Vec<MissingThumbnail>> {
        let entries = self.list_entries()?;
        let missing =
            reconcile::find_missing_thumbnails(&entries, &self.request.output_dir, &self.config)?;

        info!(
            "🖼️  {} of {} files have no thumbnail",
            missing.len(),
            entries.len()
        );
        Ok(missing)
    }

    /// Reconcile plus the thumbnail pass, as one correction set
    pub fn scan(&self) -> SyncResult<CorrectionSet> {
        let mut set = self.reconcile()?;
        set.missing_thumbnails = self.check_thumbnails()?;
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::create_catalog;
    use std::fs;

    fn request(catalog_path: PathBuf, output_dir: PathBuf) -> SyncRequest {
        SyncRequest {
            catalog_path,
            output_dir,
            image_column: "image_name".into(),
            tables: vec!["images".into()],
        }
    }

    #[test]
    fn test_validation_names_every_gap() {
        let empty = SyncRequest {
            catalog_path: PathBuf::new(),
            output_dir: PathBuf::new(),
            image_column: " ".into(),
            tables: vec![],
        };
        let Err(SyncError::Validation(message)) = Session::new(empty, SyncConfig::default())
        else {
            panic!("expected a validation error");
        };
        assert!(message.contains("catalog path"));
        assert!(message.contains("output directory"));
        assert!(message.contains("image column"));
        assert!(message.contains("table names"));
    }

    #[test]
    fn test_blank_table_name_rejected() {
        let mut req = request("c.db".into(), "out".into());
        req.tables.push(String::new());
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_missing_catalog_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(
            request(dir.path().join("absent.db"), dir.path().to_path_buf()),
            SyncConfig::default(),
        )
        .unwrap();
        assert!(matches!(session.reconcile(), Err(SyncError::Catalog(_))));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("a.png"), b"x").unwrap();
        fs::write(out.join("c.png"), b"x").unwrap();
        let catalog = create_catalog(dir.path(), &["a.png", "b.png"]);

        let session = Session::new(request(catalog, out), SyncConfig::default()).unwrap();
        let first = session.reconcile().unwrap();
        let second = session.reconcile().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.missing_images.len(), 1);
        assert_eq!(first.removed_entries.len(), 1);
        assert_eq!(first.missing_entries.len(), 1);
        assert_eq!(first.missing_entries[0].file_name, "c.png");
    }

    #[test]
    fn test_unknown_table_and_column_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = create_catalog(dir.path(), &["gone.png"]);
        let mut req = request(catalog, dir.path().to_path_buf());
        req.tables = vec!["ghosts".into(), "images".into()];

        let session = Session::new(req.clone(), SyncConfig::default()).unwrap();
        assert_eq!(session.reconcile().unwrap().removed_entries.len(), 1);

        req.image_column = "not_a_column".into();
        let session = Session::new(req, SyncConfig::default()).unwrap();
        assert!(session.reconcile().unwrap().removed_entries.is_empty());
    }

    #[test]
    fn test_scan_creates_thumbnail_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("a.png"), b"x").unwrap();
        let catalog = create_catalog(dir.path(), &["a.png"]);

        let session = Session::new(request(catalog, out.clone()), SyncConfig::default()).unwrap();
        let set = session.scan().unwrap();

        assert_eq!(set.missing_thumbnails.len(), 1);
        assert!(out.join("thumbnails").is_dir());
        assert!(set.missing_images.is_empty());
    }
}
