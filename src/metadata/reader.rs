/// Metadata Reader
///
/// Reads one image file and merges both extraction strategies into a `MetadataBag`:
/// 1. the strict chunk walk (`chunks.rs`)
/// 2. the heuristic raw scan (`scan.rs`), which only fills keys the walk missed or
///    left as something other than JSON
///
/// Reading never fails. An unreadable or non-PNG file yields an empty bag so that one
/// bad file cannot abort a directory-wide batch.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::path::Path;
use tracing::debug;

use super::chunks::{self, PngHeader, PNG_SIGNATURE};
use super::scan;

/// Dedicated metadata chunk written for finished images
pub const FINAL_METADATA_KEY: &str = "invokeai_metadata";
/// JSON node graph of the generation pipeline
pub const GRAPH_KEY: &str = "invokeai_graph";
/// Present when the image carries its editor workflow
pub const WORKFLOW_KEY: &str = "invokeai_workflow";
/// Free-text generation parameters
pub const PARAMETERS_KEY: &str = "parameters";

/// JSON-valued keys recovered by the raw scan. The final-metadata key is only
/// trusted from its own chunk, never from loose text.
const JSON_KEYS: [&str; 2] = [GRAPH_KEY, WORKFLOW_KEY];

/// Embedded metadata of one image
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MetadataBag {
    /// `IHDR` fields, if the walk got that far
    pub header: Option<PngHeader>,
    /// Size of the file in bytes
    pub byte_len: u64,
    /// Text entries in first-seen order; a later duplicate key replaces the value
    #[serde(serialize_with = "serialize_text")]
    text: Vec<(String, String)>,
}

impl MetadataBag {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.text
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a text entry, keeping its original position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.text.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.text.push((key, value)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.text.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.header.map(|h| (h.width, h.height))
    }

    /// Independent of classification; only used for catalog bookkeeping
    pub fn has_workflow(&self) -> bool {
        self.contains(WORKFLOW_KEY)
    }

    pub fn final_metadata(&self) -> Option<&str> {
        self.get(FINAL_METADATA_KEY)
    }
}

fn serialize_text<S: Serializer>(
    text: &[(String, String)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(text.len()))?;
    for (key, value) in text {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

/// Read and parse a file. Failures are absorbed into an empty bag.
pub fn read_metadata(path: &Path) -> MetadataBag {
    match std::fs::read(path) {
        Ok(buffer) => parse_metadata(&buffer),
        Err(e) => {
            debug!("Could not read {}: {}", path.display(), e);
            MetadataBag::default()
        }
    }
}

/// Parse an in-memory PNG byte stream
pub fn parse_metadata(buffer: &[u8]) -> MetadataBag {
    let mut bag = MetadataBag {
        byte_len: buffer.len() as u64,
        ..MetadataBag::default()
    };

    if !buffer.starts_with(&PNG_SIGNATURE) {
        debug!("Not a PNG stream ({} bytes)", buffer.len());
        return bag;
    }

    let walk = chunks::walk_chunks(buffer);
    bag.header = walk.header;
    for (key, value) in walk.text {
        bag.insert(key, value);
    }

    fill_from_raw_scan(&mut bag, buffer);
    bag
}

/// Second pass: fill gaps the strict walk left behind
fn fill_from_raw_scan(bag: &mut MetadataBag, buffer: &[u8]) {
    for key in JSON_KEYS {
        if bag.get(key).is_some_and(is_json) {
            continue;
        }
        if let Some(json) = scan::json_after_key(buffer, key) {
            debug!("Recovered {} from raw scan", key);
            bag.insert(key, json);
        }
    }

    if !bag.contains(PARAMETERS_KEY) {
        if let Some(value) = scan::terminated_value(buffer, PARAMETERS_KEY) {
            bag.insert(PARAMETERS_KEY, value);
        }
    }
}

fn is_json(value: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(value).is_ok()
}
