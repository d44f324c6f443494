/// Directory analysis
///
/// Batch reads every PNG in a directory and offers the inspection verbs built on top:
/// statistics, filtering by a text value, listing unclassified files, exporting a file
/// list and comparing two files.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

use super::classify::{classify, Classification};
use super::graph::{self, GraphFlags};
use super::reader::{read_metadata, MetadataBag, GRAPH_KEY};
use crate::error::SyncResult;
use crate::sync::pool::map_blocking;
use crate::sync::reconcile::list_image_entries;

/// One analyzed file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub path: PathBuf,
    pub classification: Classification,
    pub metadata: MetadataBag,
}

pub fn read_report(path: &Path) -> FileReport {
    let metadata = read_metadata(path);
    FileReport {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        classification: classify(&metadata),
        metadata,
    }
}

fn is_png(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

/// Read every PNG directly inside `dir`, at most `fan_out` files at a time.
/// Reports come back sorted by file name.
pub async fn analyze_directory(dir: &Path, fan_out: usize) -> SyncResult<Vec<FileReport>> {
    let paths: Vec<PathBuf> = list_image_entries(dir)?
        .into_iter()
        .filter(|entry| is_png(&entry.file_name))
        .map(|entry| entry.path)
        .collect();

    info!("🔍 Analyzing {} PNG files in {}", paths.len(), dir.display());

    let mut reports = Vec::with_capacity(paths.len());
    for report in map_blocking(paths, fan_out, |path| read_report(&path)).await {
        reports.push(report?);
    }
    Ok(reports)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationStats {
    pub final_images: usize,
    pub intermediate_images: usize,
    pub unknown_images: usize,
}

impl ClassificationStats {
    pub fn tally<'a>(reports: impl IntoIterator<Item = &'a FileReport>) -> Self {
        let mut stats = Self::default();
        for report in reports {
            match report.classification {
                Classification::Final => stats.final_images += 1,
                Classification::Intermediate => stats.intermediate_images += 1,
                Classification::Unknown => stats.unknown_images += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.final_images + self.intermediate_images + self.unknown_images
    }
}

/// Reports whose text value for `key` contains `value`
pub fn filter_by_text<'a>(reports: &'a [FileReport], key: &str, value: &str) -> Vec<&'a FileReport> {
    reports
        .iter()
        .filter(|report| report.metadata.get(key).is_some_and(|v| v.contains(value)))
        .collect()
}

pub fn unknown_reports(reports: &[FileReport]) -> Vec<&FileReport> {
    reports
        .iter()
        .filter(|report| report.classification == Classification::Unknown)
        .collect()
}

/// Write one path per line
pub fn save_file_list<'a>(paths: impl IntoIterator<Item = &'a Path>, output: &Path) -> io::Result<()> {
    let content = paths
        .into_iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(output, content)?;
    info!("💾 File list saved to: {}", output.display());
    Ok(())
}

/// How one side of a comparison relates to the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difference {
    MissingInFirst,
    MissingInSecond,
    Different,
    Same,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextDifference {
    pub key: String,
    pub status: Difference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDifference {
    MissingInFirst { node_id: String },
    MissingInSecond { node_id: String },
    IntermediateFlag {
        node_id: String,
        first: Option<bool>,
        second: Option<bool>,
    },
    NodeType {
        node_id: String,
        first: Option<String>,
        second: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GraphComparison {
    NeitherHasGraph,
    MissingInFirst,
    MissingInSecond,
    InvalidInFirst,
    InvalidInSecond,
    Compared {
        first: GraphFlags,
        second: GraphFlags,
        nodes: Vec<NodeDifference>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataComparison {
    pub dimensions: [Option<(u32, u32)>; 2],
    pub byte_len: [u64; 2],
    pub text: Vec<TextDifference>,
    pub graph: GraphComparison,
}

impl MetadataComparison {
    /// Text keys that are not identical on both sides
    pub fn text_differences(&self) -> usize {
        self.text
            .iter()
            .filter(|diff| diff.status != Difference::Same)
            .count()
    }
}

pub fn compare(first: &MetadataBag, second: &MetadataBag) -> MetadataComparison {
    let mut keys: Vec<&str> = first.entries().map(|(k, _)| k).collect();
    keys.extend(second.entries().map(|(k, _)| k).filter(|k| !first.contains(k)));

    let text = keys
        .into_iter()
        .map(|key| {
            let status = match (first.get(key), second.get(key)) {
                (None, _) => Difference::MissingInFirst,
                (_, None) => Difference::MissingInSecond,
                (Some(a), Some(b)) if a != b => Difference::Different,
                _ => Difference::Same,
            };
            TextDifference {
                key: key.to_string(),
                status,
            }
        })
        .collect();

    MetadataComparison {
        dimensions: [first.dimensions(), second.dimensions()],
        byte_len: [first.byte_len, second.byte_len],
        text,
        graph: compare_graphs(first.get(GRAPH_KEY), second.get(GRAPH_KEY)),
    }
}

fn compare_graphs(first: Option<&str>, second: Option<&str>) -> GraphComparison {
    let (first, second) = match (first, second) {
        (None, None) => return GraphComparison::NeitherHasGraph,
        (None, Some(_)) => return GraphComparison::MissingInFirst,
        (Some(_), None) => return GraphComparison::MissingInSecond,
        (Some(a), Some(b)) => (a, b),
    };

    let Some(first) = graph::parse_nodes(first) else {
        return GraphComparison::InvalidInFirst;
    };
    let Some(second) = graph::parse_nodes(second) else {
        return GraphComparison::InvalidInSecond;
    };

    let mut ids: Vec<&String> = first.keys().chain(second.keys()).collect();
    ids.sort();
    ids.dedup();

    let nodes = ids
        .into_iter()
        .filter_map(|id| {
            let node_id = id.clone();
            match (first.get(id), second.get(id)) {
                (None, _) => Some(NodeDifference::MissingInFirst { node_id }),
                (_, None) => Some(NodeDifference::MissingInSecond { node_id }),
                (Some(a), Some(b)) if a.is_intermediate != b.is_intermediate => {
                    Some(NodeDifference::IntermediateFlag {
                        node_id,
                        first: a.is_intermediate,
                        second: b.is_intermediate,
                    })
                }
                (Some(a), Some(b)) if a.node_type != b.node_type => Some(NodeDifference::NodeType {
                    node_id,
                    first: a.node_type.clone(),
                    second: b.node_type.clone(),
                }),
                _ => None,
            }
        })
        .collect();

    GraphComparison::Compared {
        first: graph::flags_of(&first),
        second: graph::flags_of(&second),
        nodes,
    }
}
