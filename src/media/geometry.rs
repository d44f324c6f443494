/// Image dimension probing
use std::path::Path;
use tracing::debug;

use crate::metadata::MetadataBag;

/// Width and height of an image.
///
/// PNG geometry already read from `IHDR` is reused; anything else falls back to the
/// generic header probe from the `image` crate.
pub fn probe_dimensions(path: &Path, bag: Option<&MetadataBag>) -> Option<(u32, u32)> {
    if let Some(dimensions) = bag.and_then(MetadataBag::dimensions) {
        return Some(dimensions);
    }

    match image::image_dimensions(path) {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            debug!("No dimensions for {}: {}", path.display(), e);
            None
        }
    }
}

/// Scale (width, height) down so the longer edge is at most `max_edge`.
/// Never upscales; the aspect ratio is kept, and each edge stays at least 1.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= max_edge || longer == 0 {
        return (width, height);
    }

    let scale = |edge: u32| -> u32 {
        let scaled = (u64::from(edge) * u64::from(max_edge) + u64::from(longer) / 2) / u64::from(longer);
        scaled.max(1) as u32
    };
    (scale(width), scale(height))
}
