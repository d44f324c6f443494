/// Image file handling
///
/// This module handles:
/// - Probing image dimensions (geometry.rs)
/// - Deriving downscaled thumbnails into the side-car directory (thumbnail.rs)

pub mod geometry;
pub mod thumbnail;
