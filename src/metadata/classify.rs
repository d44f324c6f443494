/// Classifier
///
/// Assigns Final / Intermediate / Unknown from a `MetadataBag`. Rules are checked in
/// order and the first match wins:
/// 1. the dedicated final metadata key is present -> Final
/// 2. the node graph marks any node final -> Final; marks nodes intermediate only -> Intermediate
/// 3. `parameters` mentions "intermediate" -> Intermediate; mentions "final" -> Final, but
///    only when the bag also carries a node graph
/// 4. otherwise Unknown

use serde::Serialize;
use std::fmt;

use super::graph;
use super::reader::{MetadataBag, FINAL_METADATA_KEY, GRAPH_KEY, PARAMETERS_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Final,
    Intermediate,
    Unknown,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Classification::Final => "final",
            Classification::Intermediate => "intermediate",
            Classification::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

pub fn classify(bag: &MetadataBag) -> Classification {
    if bag.contains(FINAL_METADATA_KEY) {
        return Classification::Final;
    }

    let graph_json = bag.get(GRAPH_KEY);
    if let Some(json) = graph_json {
        let flags = graph::interpret(json);
        if flags.any_final() {
            return Classification::Final;
        }
        if flags.any_intermediate() {
            return Classification::Intermediate;
        }
    }

    if let Some(parameters) = bag.get(PARAMETERS_KEY) {
        if parameters.contains("intermediate") {
            return Classification::Intermediate;
        }
        if parameters.contains("final") && graph_json.is_some() {
            return Classification::Final;
        }
    }

    Classification::Unknown
}
