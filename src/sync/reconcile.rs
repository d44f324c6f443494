/// Reconciliation Engine
///
/// Diffs catalog rows against the top level of the output directory. Both the
/// "missing image" display set and the "removed entry" delete set come out of one
/// presence probe per row, so the two can only differ where the probe says they must.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::SyncConfig;
use crate::media::thumbnail::{thumbnail_dir, thumbnail_path};
use crate::state::data::{
    CatalogRecord, CatalogRef, CorrectionSet, FileSystemEntry, MissingEntry, MissingThumbnail,
};

/// Recognized image extensions, matched case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "bmp", "webp"];

pub fn is_image_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Image files directly inside `dir`, sorted by name.
///
/// Directories (the thumbnail folder included) never match, whatever their name.
pub fn list_image_entries(dir: &Path) -> io::Result<Vec<FileSystemEntry>> {
    if !fs::metadata(dir)?.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Not a directory: {}", dir.display()),
        ));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(file_name) = entry.file_name().to_str() else {
            warn!("Skipping non UTF-8 file name: {:?}", entry.file_name());
            continue;
        };

        if is_image_name(file_name) {
            entries.push(FileSystemEntry {
                file_name: file_name.to_string(),
                path: entry.path().to_path_buf(),
            });
        }
    }

    Ok(entries)
}

/// Where a catalog reference stands against the output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Listed and on disk
    Present,
    /// On disk, but not among the listed image files
    Unlisted,
    /// Not on disk
    Missing,
}

/// Probe one referenced file name.
///
/// A probe that fails for any reason other than "not found" counts as existing: the
/// Missing verdict feeds a destructive delete and must never be a false positive.
pub fn probe_presence(file_name: &str, listed: &HashSet<&str>, output_dir: &Path) -> Presence {
    let path = output_dir.join(file_name);
    let exists = match fs::metadata(&path) {
        Ok(_) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Could not probe {}: {}", path.display(), e);
            true
        }
    };

    match (exists, listed.contains(file_name)) {
        (false, _) => Presence::Missing,
        (true, true) => Presence::Present,
        (true, false) => Presence::Unlisted,
    }
}

/// Compute the catalog-facing part of the correction set.
///
/// Rows with an empty reference are ignored. Every non-empty reference claims its file
/// name, whether or not the file exists, so no claimed name can show up in
/// `missing_entries`. Duplicate references each produce their own entries.
pub fn reconcile(
    records: &[CatalogRecord],
    entries: &[FileSystemEntry],
    output_dir: &Path,
) -> CorrectionSet {
    let listed: HashSet<&str> = entries.iter().map(|e| e.file_name.as_str()).collect();
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut set = CorrectionSet::default();

    for record in records {
        let (Some(name), Some(image_path)) = (record.image_name(), record.image_ref.as_deref())
        else {
            continue;
        };
        claimed.insert(name);

        let reference = CatalogRef {
            table: record.table.clone(),
            row_id: record.row_id,
            image_path: image_path.to_string(),
        };

        match probe_presence(name, &listed, output_dir) {
            Presence::Present => {}
            Presence::Unlisted => set.missing_images.push(reference),
            Presence::Missing => {
                set.missing_images.push(reference.clone());
                set.removed_entries.push(reference);
            }
        }
    }

    set.missing_entries = entries
        .iter()
        .filter(|entry| !claimed.contains(entry.file_name.as_str()))
        .map(|entry| MissingEntry {
            file_name: entry.file_name.clone(),
            image_path: entry.path.clone(),
        })
        .collect();

    set
}

/// Files whose derived thumbnail does not exist.
///
/// When the thumbnail directory is absent every file is reported, and the directory is
/// created so the next derive pass has somewhere to write.
pub fn find_missing_thumbnails(
    entries: &[FileSystemEntry],
    output_dir: &Path,
    config: &SyncConfig,
) -> io::Result<Vec<MissingThumbnail>> {
    let dir = thumbnail_dir(output_dir, config);
    let dir_exists = dir.is_dir();
    if !dir_exists {
        fs::create_dir_all(&dir)?;
        info!("📁 Created thumbnail directory: {}", dir.display());
    }

    let missing = entries
        .iter()
        .map(|entry| MissingThumbnail {
            file_name: entry.file_name.clone(),
            image_path: entry.path.clone(),
            thumbnail_path: thumbnail_path(output_dir, &entry.file_name, config),
        })
        .filter(|missing| !dir_exists || !missing.thumbnail_path.exists())
        .collect();

    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(row_id: i64, image_ref: &str) -> CatalogRecord {
        CatalogRecord {
            table: "images".into(),
            row_id,
            image_ref: Some(image_ref.into()),
            columns: BTreeMap::new(),
        }
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_extension_filter() {
        assert!(is_image_name("a.PNG"));
        assert!(is_image_name("b.webp"));
        assert!(is_image_name("c.JpEg"));
        assert!(!is_image_name("notes.txt"));
        assert!(!is_image_name("png"));
    }

    #[test]
    fn test_listing_skips_directories_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.png");
        touch(dir.path(), "a.jpg");
        touch(dir.path(), "readme.txt");
        fs::create_dir(dir.path().join("thumbnails")).unwrap();
        fs::create_dir(dir.path().join("folder.png")).unwrap();

        let names: Vec<String> = list_image_entries(dir.path())
            .unwrap()
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_listing_missing_dir_fails() {
        assert!(list_image_entries(Path::new("/nonexistent/output")).is_err());
    }

    #[test]
    fn test_row_without_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        let entries = list_image_entries(dir.path()).unwrap();

        let set = reconcile(&[record(1, "a.png"), record(2, "b.png")], &entries, dir.path());

        assert_eq!(set.missing_images.len(), 1);
        assert_eq!(set.missing_images[0].row_id, 2);
        assert_eq!(set.removed_entries, set.missing_images);
        assert!(set.missing_entries.is_empty());
    }

    #[test]
    fn test_file_without_row() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "c.png");
        let entries = list_image_entries(dir.path()).unwrap();

        let set = reconcile(&[record(1, "a.png")], &entries, dir.path());

        assert_eq!(set.missing_entries.len(), 1);
        assert_eq!(set.missing_entries[0].file_name, "c.png");
        assert!(set.missing_images.is_empty());
    }

    #[test]
    fn test_claimed_names_never_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "b.png");
        let entries = list_image_entries(dir.path()).unwrap();
        let records = vec![
            record(1, "sub/a.png"),
            record(2, "a.png"),
            record(3, "gone.png"),
            record(4, "b.png"),
        ];

        let set = reconcile(&records, &entries, dir.path());
        let claimed: HashSet<&str> = records.iter().filter_map(|r| r.image_name()).collect();
        assert!(set
            .missing_entries
            .iter()
            .all(|e| !claimed.contains(e.file_name.as_str())));
        assert!(set.missing_entries.is_empty());
    }

    #[test]
    fn test_unlisted_file_is_never_removed() {
        let dir = tempfile::tempdir().unwrap();
        // Exists on disk but is not a recognized image
        touch(dir.path(), "legacy.tiff");
        let entries = list_image_entries(dir.path()).unwrap();

        let set = reconcile(&[record(7, "legacy.tiff")], &entries, dir.path());
        assert_eq!(set.missing_images.len(), 1);
        assert!(set.removed_entries.is_empty());
    }

    #[test]
    fn test_empty_reference_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut blank = record(1, "");
        let set = reconcile(&[blank.clone()], &[], dir.path());
        assert!(set.is_clean());

        blank.image_ref = None;
        assert!(reconcile(&[blank], &[], dir.path()).is_clean());
    }

    #[test]
    fn test_probe_presence_states() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "b.png");
        let listed: HashSet<&str> = ["a.png"].into_iter().collect();

        assert_eq!(probe_presence("a.png", &listed, dir.path()), Presence::Present);
        assert_eq!(probe_presence("b.png", &listed, dir.path()), Presence::Unlisted);
        assert_eq!(probe_presence("c.png", &listed, dir.path()), Presence::Missing);
    }

    #[test]
    fn test_thumbnail_dir_absent_reports_everything() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "b.png");
        let entries = list_image_entries(dir.path()).unwrap();
        let config = SyncConfig::default();

        let missing = find_missing_thumbnails(&entries, dir.path(), &config).unwrap();
        assert_eq!(missing.len(), 2);
        assert!(dir.path().join("thumbnails").is_dir());
    }

    #[test]
    fn test_thumbnail_matched_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.png");
        touch(dir.path(), "b.png");
        fs::create_dir(dir.path().join("thumbnails")).unwrap();
        touch(&dir.path().join("thumbnails"), "a.webp");
        let entries = list_image_entries(dir.path()).unwrap();

        let missing = find_missing_thumbnails(&entries, dir.path(), &SyncConfig::default()).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].file_name, "b.png");
        assert!(missing[0].thumbnail_path.ends_with("thumbnails/b.webp"));
    }
}
