//! Record framing shared by file and live decoders
//!
//! A frame is a JSON object tagged with its record kind, carrying either
//! one record or a batch:
//!
//! ```text
//! {"kind": "plot", "record": {...}}
//! {"kind": "plot", "records": [{...}, {...}]}
//! ```

use std::collections::HashMap;

use contracts::{DecodedChunk, TaggedTree};
use serde_json::{Map, Value};

/// Split a frame into its kind and record objects
pub(crate) fn split_frame(frame: Value) -> Result<(String, Vec<Value>), String> {
    let Value::Object(mut object) = frame else {
        return Err("frame is not a JSON object".to_string());
    };

    let kind = match object.remove("kind") {
        Some(Value::String(kind)) if !kind.is_empty() => kind,
        Some(_) => return Err("frame 'kind' must be a non-empty string".to_string()),
        None => return Err("frame has no 'kind'".to_string()),
    };

    let records = match (object.remove("record"), object.remove("records")) {
        (Some(record @ Value::Object(_)), None) => vec![record],
        (None, Some(Value::Array(records))) => {
            if let Some(bad) = records.iter().position(|r| !r.is_object()) {
                return Err(format!("records[{bad}] of kind '{kind}' is not an object"));
            }
            records
        }
        (Some(_), Some(_)) => {
            return Err("frame carries both 'record' and 'records'".to_string());
        }
        _ => return Err(format!("frame of kind '{kind}' has no record object(s)")),
    };

    Ok((kind, records))
}

/// Stamp a field on every record object
pub(crate) fn stamp(records: &mut [Value], field: &str, value: &str) {
    for record in records {
        if let Value::Object(map) = record {
            map.insert(field.to_string(), Value::String(value.to_string()));
        }
    }
}

/// Groups records per kind in first-seen order until a chunk is cut
#[derive(Debug, Default)]
pub(crate) struct TreeAccumulator {
    order: Vec<String>,
    groups: HashMap<String, Vec<Value>>,
    records: usize,
}

impl TreeAccumulator {
    pub(crate) fn push(&mut self, kind: String, mut records: Vec<Value>) {
        self.records += records.len();
        match self.groups.get_mut(&kind) {
            Some(group) => group.append(&mut records),
            None => {
                self.order.push(kind.clone());
                self.groups.insert(kind, records);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Cut a chunk from everything accumulated so far
    pub(crate) fn take(&mut self, is_last: bool) -> DecodedChunk {
        let mut groups = std::mem::take(&mut self.groups);
        let trees = std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|kind| {
                let records = groups.remove(&kind)?;
                Some(TaggedTree::new(kind, records))
            })
            .collect();
        self.records = 0;
        DecodedChunk { trees, is_last }
    }
}

/// Build a frame object (used by tests and tools producing recordings)
pub fn make_frame(kind: &str, records: Vec<Value>) -> Value {
    let mut frame = Map::new();
    frame.insert("kind".to_string(), Value::String(kind.to_string()));
    frame.insert("records".to_string(), Value::Array(records));
    Value::Object(frame)
}
