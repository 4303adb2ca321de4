//! Dot-path evaluation over records.
//!
//! Paths are `.`-separated field names, each optionally followed by one or
//! more list indexes: `Parent.Name`, `Readings[0].Value`, `Grid[1][2]`.
//! Evaluation is a plain recursive descent; any segment that is absent, of
//! the wrong shape, or out of range ends the walk with `None`.

use super::{Record, Value};

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// Parse a path into segments.
///
/// Returns `None` for malformed paths (empty segments, unterminated or
/// non-numeric indexes).
pub fn parse(path: &str) -> Option<Vec<Segment>> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if name.is_empty() {
            return None;
        }
        segments.push(Segment::Field(name.to_string()));

        while !rest.is_empty() {
            let close = rest.find(']')?;
            if !rest.starts_with('[') {
                return None;
            }
            let index = rest[1..close].trim().parse::<usize>().ok()?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Some(segments)
}

/// Evaluate a path against a record.
pub fn evaluate<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let segments = parse(path)?;
    let (first, rest) = segments.split_first()?;
    let start = match first {
        Segment::Field(name) => record.field(name)?,
        Segment::Index(_) => return None,
    };
    descend(start, rest)
}

fn descend<'a>(value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return (!value.is_null()).then_some(value);
    };

    let next = match (segment, value) {
        (Segment::Field(name), Value::Record(record)) => record.field(name)?,
        (Segment::Index(i), Value::List(items)) => items.get(*i)?,
        _ => return None,
    };
    descend(next, rest)
}
