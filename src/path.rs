//! Dotted/bracketed field paths over nested records
//!
//! A path such as `component[0].valueQuantity.value` is a sequence of
//! dot-separated segments. A segment is either a bare key, or a key followed
//! by one bracketed non-negative index. Resolution never fails loudly: any
//! mismatch between the path and the record simply yields `None`.

use crate::types::Record;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static INDEXED_SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^\[\]]*)\[(\d+)\]$").unwrap()
});

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Look up a key in a mapping
    Key(String),
    /// Look up a key, then take the element at `index` of the resulting sequence.
    /// An empty key indexes the current value directly.
    Indexed { key: String, index: usize },
}

impl PathSegment {
    fn parse(raw: &str) -> Option<Self> {
        if !raw.contains('[') && !raw.contains(']') {
            return Some(PathSegment::Key(raw.to_string()));
        }

        let caps = INDEXED_SEGMENT_REGEX.captures(raw)?;
        let index = caps[2].parse::<usize>().ok()?;
        Some(PathSegment::Indexed {
            key: caps[1].to_string(),
            index,
        })
    }

    /// The mapping key this segment looks up
    pub fn key(&self) -> &str {
        match self {
            PathSegment::Key(key) => key,
            PathSegment::Indexed { key, .. } => key,
        }
    }

    fn step<'a>(&self, current: &'a Value) -> Option<&'a Value> {
        match self {
            PathSegment::Key(key) => current.as_object()?.get(key),
            PathSegment::Indexed { key, index } => {
                let container = if key.is_empty() {
                    current
                } else {
                    current.as_object()?.get(key)?
                };
                container.as_array()?.get(*index)
            }
        }
    }
}

/// A parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parse a path; returns `None` for empty or malformed paths
    pub fn parse(path: &str) -> Option<Self> {
        if path.is_empty() {
            return None;
        }

        let segments = path
            .split('.')
            .map(PathSegment::parse)
            .collect::<Option<Vec<_>>>()?;

        Some(FieldPath {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Key of the first segment, e.g. `code` for `code.coding[0]`
    pub fn first_key(&self) -> &str {
        self.segments[0].key()
    }

    /// Raw text of the final segment, e.g. `value` for `valueQuantity.value`
    pub fn last_segment(&self) -> &str {
        self.raw.rsplit('.').next().unwrap_or(&self.raw)
    }

    /// Walk the path from `root`
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        // A null intermediate fails the next step's shape check
        self.segments
            .iter()
            .try_fold(root, |current, segment| segment.step(current))
    }

    /// Walk the path from a record
    pub fn resolve_in<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;

        let mut current = match first {
            PathSegment::Key(key) => record.get(key)?,
            PathSegment::Indexed { key, index } => record.get(key)?.as_array()?.get(*index)?,
        };

        for segment in rest {
            current = segment.step(current)?;
        }

        Some(current)
    }
}

/// Resolve `path` against `record`
///
/// Returns `None` when the path is malformed, a key is missing, an index is
/// out of bounds, or an intermediate value is null or of the wrong shape.
/// A final value of JSON `null` is returned as `Some(Value::Null)`.
pub fn resolve<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    FieldPath::parse(path)?.resolve_in(record)
}
