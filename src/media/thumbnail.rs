use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::{imageops::FilterType, DynamicImage};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use super::geometry::fit_within;
use crate::config::{SyncConfig, ThumbnailFormat};

/// Why a thumbnail could not be created
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The source path has no usable file name
    #[error("Unsupported source name: {0}")]
    UnsupportedName(PathBuf),
}

/// Result of a derive request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailOutcome {
    /// A new artifact was written
    Created(PathBuf),
    /// An artifact already existed and was left untouched
    Existing(PathBuf),
}

/// Get the thumbnail side-car directory for an output directory
pub fn thumbnail_dir(output_dir: &Path, config: &SyncConfig) -> PathBuf {
    output_dir.join(&config.thumbnail_dir)
}

/// Derived file name: source extension stripped, thumbnail extension appended
pub fn thumbnail_name(file_name: &str, format: ThumbnailFormat) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    format!("{}.{}", stem, format.extension())
}

/// Get the thumbnail path for a source file name (doesn't generate, just returns the expected path)
pub fn thumbnail_path(output_dir: &Path, file_name: &str, config: &SyncConfig) -> PathBuf {
    thumbnail_dir(output_dir, config).join(thumbnail_name(file_name, config.thumbnail_format))
}

/// Make sure a thumbnail exists for `source`.
///
/// An existing artifact is trusted as current and never rewritten, even if the source
/// changed since. New artifacts are downscaled only (longer edge at most
/// `thumbnail_max_edge`) and written through a private temp file that is moved into
/// place only if the target is still free. Two sources sharing a stem therefore
/// yield one `Created` and one `Existing`.
pub fn ensure_thumbnail(
    source: &Path,
    output_dir: &Path,
    config: &SyncConfig,
) -> Result<ThumbnailOutcome, ThumbnailError> {
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ThumbnailError::UnsupportedName(source.to_path_buf()))?;

    let dir = thumbnail_dir(output_dir, config);
    fs::create_dir_all(&dir)?;

    let target = dir.join(thumbnail_name(file_name, config.thumbnail_format));
    if target.exists() {
        return Ok(ThumbnailOutcome::Existing(target));
    }

    let img = image::open(source)?;
    let (width, height) = fit_within(img.width(), img.height(), config.thumbnail_max_edge);
    let thumbnail = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    let encoded = encode(&thumbnail, config)?;
    if !write_new(&dir, &target, &encoded)? {
        debug!("Thumbnail appeared while encoding: {}", target.display());
        return Ok(ThumbnailOutcome::Existing(target));
    }

    debug!("📸 Generated thumbnail: {}", target.display());
    Ok(ThumbnailOutcome::Created(target))
}

fn encode(img: &DynamicImage, config: &SyncConfig) -> Result<Vec<u8>, ThumbnailError> {
    let mut buffer = Vec::new();
    match config.thumbnail_format {
        ThumbnailFormat::Webp => {
            // The WebP encoder only takes 8-bit RGB(A)
            DynamicImage::ImageRgba8(img.to_rgba8())
                .write_with_encoder(WebPEncoder::new_lossless(&mut buffer))?;
        }
        ThumbnailFormat::Jpeg => {
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(
                JpegEncoder::new_with_quality(&mut buffer, config.thumbnail_quality),
            )?;
        }
    }
    Ok(buffer)
}

/// Write to a temp file in `dir`, then move it to `target` without replacing an
/// existing file. Returns false if `target` was already taken.
fn write_new(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<bool> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.flush()?;

    match temp.persist_noclobber(target) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}
