/// Mutation Operations
///
/// Each operation consumes one slice of a correction set and reports a summary with
/// counts. Only request validation and a failed catalog open end an operation early;
/// per-file and per-row failures are logged, counted, and the batch moves on.
/// Statements are not wrapped in a transaction, so a partial run stays applied.

use rusqlite::types::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::pool::map_blocking;
use super::reconcile::{probe_presence, Presence};
use super::Session;
use crate::error::SyncResult;
use crate::media::geometry::probe_dimensions;
use crate::media::thumbnail::{ensure_thumbnail, ThumbnailOutcome};
use crate::metadata::{classify, read_metadata, Classification};
use crate::state::data::{
    base_name, CatalogRef, MissingEntry, MissingThumbnail, MutationOutcome, RemoveEntriesCounts,
    RestoreEntriesCounts, ThumbnailCounts,
};
use crate::state::library::Catalog;

/// What an orphan file turned out to be
#[derive(Debug, Clone)]
struct OrphanProbe {
    file_name: String,
    classification: Classification,
    dimensions: Option<(u32, u32)>,
    has_workflow: bool,
    final_metadata: Option<String>,
}

fn probe_orphan(entry: MissingEntry) -> OrphanProbe {
    let bag = read_metadata(&entry.image_path);
    let classification = classify(&bag);

    // Geometry and metadata only matter for rows we are going to insert
    let (dimensions, has_workflow, final_metadata) = if classification == Classification::Final {
        (
            probe_dimensions(&entry.image_path, Some(&bag)),
            bag.has_workflow(),
            bag.final_metadata().map(str::to_string),
        )
    } else {
        (None, false, None)
    };

    OrphanProbe {
        file_name: entry.file_name,
        classification,
        dimensions,
        has_workflow,
        final_metadata,
    }
}

/// A table that can take restored rows, and which optional columns it has
#[derive(Debug, Clone)]
struct InsertTarget {
    table: String,
    workflow_column: bool,
    metadata_column: bool,
}

impl Session {
    fn insert_targets(&self, catalog: &Catalog) -> SyncResult<Vec<InsertTarget>> {
        let mut targets = Vec::new();
        for table in &self.request.tables {
            let columns = catalog.table_columns(table)?;
            if !columns.contains(&self.request.image_column) {
                debug!("Table {} cannot take restored rows", table);
                continue;
            }
            targets.push(InsertTarget {
                table: table.clone(),
                workflow_column: columns.contains(&self.config.workflow_column),
                metadata_column: columns.contains(&self.config.metadata_column),
            });
        }
        Ok(targets)
    }

    fn row_values(
        &self,
        probe: &OrphanProbe,
        (width, height): (u32, u32),
        target: &InsertTarget,
    ) -> Vec<(String, Value)> {
        let mut values = vec![
            (
                self.request.image_column.clone(),
                Value::Text(probe.file_name.clone()),
            ),
            (
                "image_origin".to_string(),
                Value::Text(self.config.image_origin.clone()),
            ),
            (
                "image_category".to_string(),
                Value::Text(self.config.image_category.clone()),
            ),
            ("width".to_string(), Value::Integer(i64::from(width))),
            ("height".to_string(), Value::Integer(i64::from(height))),
        ];

        if target.workflow_column {
            values.push((
                self.config.workflow_column.clone(),
                Value::Integer(i64::from(probe.has_workflow)),
            ));
        }
        if target.metadata_column {
            if let Some(metadata) = &probe.final_metadata {
                values.push((self.config.metadata_column.clone(), Value::Text(metadata.clone())));
            }
        }

        values
    }

    /// Insert catalog rows for orphan files, but only for files classified Final.
    ///
    /// Files are read and classified with bounded fan-out; inserts then run one at a
    /// time, in input order, into every requested table that has the image column.
    pub async fn restore_catalog_entries(
        &self,
        entries: &[MissingEntry],
    ) -> SyncResult<MutationOutcome<RestoreEntriesCounts>> {
        if entries.is_empty() {
            return Ok(MutationOutcome::nothing_to_do(
                "No missing catalog entries to restore",
            ));
        }

        let probes = map_blocking(entries.to_vec(), self.config.fan_out, probe_orphan).await;

        let catalog = self.open_catalog()?;
        let targets = self.insert_targets(&catalog)?;
        if targets.is_empty() {
            return Ok(MutationOutcome::nothing_to_do(format!(
                "No table has a {} column",
                self.request.image_column
            )));
        }

        let mut counts = RestoreEntriesCounts::default();
        for probe in probes {
            let probe = match probe {
                Ok(probe) => probe,
                Err(e) => {
                    warn!("⚠️  Metadata worker failed: {}", e);
                    counts.errors += 1;
                    continue;
                }
            };

            match probe.classification {
                Classification::Final => {}
                Classification::Intermediate => {
                    debug!("Skipping intermediate image {}", probe.file_name);
                    counts.skipped_intermediate += 1;
                    continue;
                }
                Classification::Unknown => {
                    debug!("Skipping unclassified image {}", probe.file_name);
                    counts.skipped_unknown += 1;
                    continue;
                }
            }

            let Some(dimensions) = probe.dimensions else {
                warn!("⚠️  Could not read dimensions of {}", probe.file_name);
                counts.errors += 1;
                continue;
            };

            for target in &targets {
                let values = self.row_values(&probe, dimensions, target);
                match catalog.insert_row(&target.table, &values) {
                    Ok(row_id) => {
                        debug!("Restored {} as {}#{}", probe.file_name, target.table, row_id);
                        counts.restored += 1;
                    }
                    Err(e) => {
                        warn!("⚠️  Error restoring {} into {}: {}", probe.file_name, target.table, e);
                        counts.errors += 1;
                    }
                }
            }
        }

        info!(
            "✅ Restored {} catalog entries in {} ({} intermediate, {} unknown skipped, {} errors)",
            counts.restored,
            catalog.path().display(),
            counts.skipped_intermediate,
            counts.skipped_unknown,
            counts.errors
        );

        Ok(MutationOutcome {
            success: true,
            message: format!(
                "{} catalog entries restored, {} intermediate and {} unknown images skipped, {} errors.",
                counts.restored, counts.skipped_intermediate, counts.skipped_unknown, counts.errors
            ),
            counts,
        })
    }

    /// Delete catalog rows whose image is gone, grouped by table and batched.
    ///
    /// Each row's file is probed again right before deleting; a row whose file has
    /// reappeared since the scan is left alone.
    pub fn remove_entries(
        &self,
        entries: &[CatalogRef],
    ) -> SyncResult<MutationOutcome<RemoveEntriesCounts>> {
        if entries.is_empty() {
            return Ok(MutationOutcome::nothing_to_do("No entries to remove"));
        }

        let catalog = self.open_catalog()?;
        let no_listing: HashSet<&str> = HashSet::new();

        let mut by_table: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
        let mut still_present = 0;
        for entry in entries {
            let name = base_name(&entry.image_path);
            let presence = probe_presence(name, &no_listing, &self.request.output_dir);
            if presence != Presence::Missing {
                warn!("{} exists again, keeping row {}#{}", name, entry.table, entry.row_id);
                still_present += 1;
                continue;
            }
            by_table.entry(entry.table.as_str()).or_default().push(entry.row_id);
        }

        let mut counts = RemoveEntriesCounts::default();
        for (table, row_ids) in &by_table {
            for batch in row_ids.chunks(self.config.delete_batch_size) {
                counts.removed += catalog.delete_rows(table, batch)?;
            }
            counts.tables += 1;
        }

        info!(
            "🗑️  Removed {} rows from {} tables ({} kept)",
            counts.removed, counts.tables, still_present
        );

        let mut message = format!("{} entries were removed from the catalog.", counts.removed);
        if still_present > 0 {
            message.push_str(&format!(" {} kept because their file exists.", still_present));
        }

        Ok(MutationOutcome {
            success: true,
            message,
            counts,
        })
    }

    /// Derive thumbnails for the given files with bounded fan-out
    pub async fn restore_thumbnails(
        &self,
        missing: &[MissingThumbnail],
    ) -> SyncResult<MutationOutcome<ThumbnailCounts>> {
        if missing.is_empty() {
            return Ok(MutationOutcome::nothing_to_do("No thumbnails to restore"));
        }

        let sources: Vec<PathBuf> = missing.iter().map(|m| m.image_path.clone()).collect();
        let output_dir = self.request.output_dir.clone();
        let config = self.config.clone();

        let results = map_blocking(sources, self.config.fan_out, move |source| {
            let outcome = ensure_thumbnail(&source, &output_dir, &config);
            (source, outcome)
        })
        .await;

        let mut counts = ThumbnailCounts::default();
        for result in results {
            match result {
                Ok((_, Ok(ThumbnailOutcome::Created(_)))) => counts.created += 1,
                Ok((_, Ok(ThumbnailOutcome::Existing(_)))) => counts.existing += 1,
                Ok((source, Err(e))) => {
                    warn!("⚠️  No thumbnail for {}: {}", source.display(), e);
                    counts.errors += 1;
                }
                Err(e) => {
                    warn!("⚠️  Thumbnail worker failed: {}", e);
                    counts.errors += 1;
                }
            }
        }

        info!(
            "📸 Thumbnails: {} created, {} already present, {} errors",
            counts.created, counts.existing, counts.errors
        );

        Ok(MutationOutcome {
            success: true,
            message: format!(
                "{} thumbnails created, {} errors.",
                counts.created, counts.errors
            ),
            counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::sync::SyncRequest;
    use crate::test_support::{create_catalog, text_chunk, write_final_png, write_png};
    use std::fs;
    use std::path::Path;

    fn session(dir: &Path, rows: &[&str]) -> (Session, PathBuf) {
        let out = dir.join("out");
        fs::create_dir_all(&out).unwrap();
        let request = SyncRequest {
            catalog_path: create_catalog(dir, rows),
            output_dir: out.clone(),
            image_column: "image_name".into(),
            tables: vec!["images".into()],
        };
        (Session::new(request, SyncConfig::default()).unwrap(), out)
    }

    #[tokio::test]
    async fn test_restores_only_final_images() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &["a.png"]);

        write_png(&out, "a.png", 4, 4, &[]);
        write_final_png(&out, "c.png");
        write_png(
            &out,
            "i.png",
            4,
            4,
            &[text_chunk("invokeai_graph", r#"{"nodes":{"n":{"is_intermediate":true}}}"#)],
        );
        write_png(&out, "u.png", 4, 4, &[text_chunk("parameters", "final")]);

        let set = session.reconcile().unwrap();
        assert_eq!(set.missing_entries.len(), 3);

        let outcome = session.restore_catalog_entries(&set.missing_entries).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.counts,
            RestoreEntriesCounts {
                restored: 1,
                skipped_intermediate: 1,
                skipped_unknown: 1,
                errors: 0,
            }
        );

        let catalog = Catalog::open(&session.request().catalog_path).unwrap();
        let rows = catalog.list_rows("images", "image_name").unwrap();
        let restored = rows.iter().find(|r| r.image_name() == Some("c.png")).unwrap();
        assert_eq!(restored.columns["width"], serde_json::json!(8));
        assert_eq!(restored.columns["height"], serde_json::json!(6));
        assert_eq!(restored.columns["image_origin"], serde_json::json!("internal"));
        assert_eq!(restored.columns["has_workflow"], serde_json::json!(0));
        assert!(rows.iter().all(|r| r.image_name() != Some("i.png")));
        assert!(rows.iter().all(|r| r.image_name() != Some("u.png")));

        // The orphan is no longer reported
        let after = session.reconcile().unwrap();
        assert_eq!(after.missing_entries.len(), 2);
    }

    #[tokio::test]
    async fn test_restore_writes_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &[]);
        write_png(
            &out,
            "f.png",
            3,
            5,
            &[
                text_chunk("invokeai_metadata", r#"{"seed":42}"#),
                text_chunk("invokeai_workflow", r#"{"name":"wf"}"#),
            ],
        );

        let set = session.reconcile().unwrap();
        let outcome = session.restore_catalog_entries(&set.missing_entries).await.unwrap();
        assert_eq!(outcome.counts.restored, 1);

        let catalog = Catalog::open(&session.request().catalog_path).unwrap();
        let rows = catalog.list_rows("images", "image_name").unwrap();
        assert_eq!(rows[0].columns["has_workflow"], serde_json::json!(1));
        assert_eq!(rows[0].columns["metadata"], serde_json::json!(r#"{"seed":42}"#));
    }

    #[tokio::test]
    async fn test_restore_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let (session, _) = session(dir.path(), &[]);
        let outcome = session.restore_catalog_entries(&[]).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.counts, RestoreEntriesCounts::default());
    }

    #[tokio::test]
    async fn test_insert_failure_is_counted() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &[]);
        write_final_png(&out, "c.png");

        // A table with the image column but none of the required ones
        let conn = rusqlite::Connection::open(&session.request().catalog_path).unwrap();
        conn.execute("CREATE TABLE strict_images (image_name TEXT NOT NULL)", [])
            .unwrap();
        drop(conn);

        let mut request = session.request().clone();
        request.tables = vec!["strict_images".into(), "images".into()];
        let session = Session::new(request, SyncConfig::default()).unwrap();

        let set = session.reconcile().unwrap();
        let outcome = session.restore_catalog_entries(&set.missing_entries).await.unwrap();
        assert_eq!(outcome.counts.restored, 1);
        assert_eq!(outcome.counts.errors, 1);
    }

    #[test]
    fn test_remove_entries_deletes_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &["a.png", "b.png", "c.png", "d.png"]);
        fs::write(out.join("a.png"), b"x").unwrap();

        let config = SyncConfig {
            delete_batch_size: 2,
            ..SyncConfig::default()
        };
        let session = Session::new(session.request().clone(), config).unwrap();

        let set = session.reconcile().unwrap();
        assert_eq!(set.removed_entries.len(), 3);

        let outcome = session.remove_entries(&set.removed_entries).unwrap();
        assert_eq!(outcome.counts, RemoveEntriesCounts { removed: 3, tables: 1 });

        let after = session.reconcile().unwrap();
        assert!(after.removed_entries.is_empty());
        assert!(after.missing_images.is_empty());
    }

    #[test]
    fn test_remove_keeps_rows_whose_file_returned() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &["b.png"]);

        let set = session.reconcile().unwrap();
        assert_eq!(set.removed_entries.len(), 1);

        fs::write(out.join("b.png"), b"x").unwrap();
        let outcome = session.remove_entries(&set.removed_entries).unwrap();
        assert_eq!(outcome.counts.removed, 0);
        assert!(outcome.message.contains("kept"));
    }

    #[tokio::test]
    async fn test_restore_thumbnails_tallies_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &[]);
        write_png(&out, "good.png", 300, 150, &[]);
        fs::write(out.join("bad.png"), b"not a png").unwrap();

        let missing = session.check_thumbnails().unwrap();
        assert_eq!(missing.len(), 2);

        let outcome = session.restore_thumbnails(&missing).await.unwrap();
        assert_eq!(outcome.counts.created, 1);
        assert_eq!(outcome.counts.errors, 1);

        let thumb = out.join("thumbnails").join("good.webp");
        assert_eq!(image::image_dimensions(&thumb).unwrap(), (256, 128));

        let remaining = session.check_thumbnails().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].file_name, "bad.png");
    }

    #[tokio::test]
    async fn test_same_stem_thumbnails_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let (session, out) = session(dir.path(), &[]);
        write_png(&out, "a.png", 1500, 750, &[]);
        image::RgbImage::new(750, 1500).save(out.join("a.jpg")).unwrap();

        for _ in 0..5 {
            let _ = fs::remove_dir_all(out.join("thumbnails"));
            let missing = session.check_thumbnails().unwrap();
            assert_eq!(missing.len(), 2);

            let outcome = session.restore_thumbnails(&missing).await.unwrap();
            assert_eq!(outcome.counts.created, 1);
            assert_eq!(outcome.counts.existing, 1);
            assert_eq!(outcome.counts.errors, 0);

            let thumbs: Vec<_> = fs::read_dir(out.join("thumbnails"))
                .unwrap()
                .map(|e| e.unwrap().file_name())
                .collect();
            assert_eq!(thumbs, vec![std::ffi::OsString::from("a.webp")]);

            let dims = image::image_dimensions(out.join("thumbnails").join("a.webp")).unwrap();
            assert!(dims == (256, 128) || dims == (128, 256));
        }
    }
}
