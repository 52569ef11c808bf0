//! Built-in transform implementations
//!
//! Each transform handles a specific body format.

use super::types::Transform;
use crate::error::{Error, Result};
use crate::types::Chunk;
use bytes::Bytes;
use serde_json::{json, Value};

// ============================================================================
// JSON Document
// ============================================================================

/// Buffers the whole body and emits the records of one JSON document.
///
/// Records are the items of the array found at `record_path` (a single
/// non-array value is one record; a missing path yields none). Without a path
/// a top-level array is split into records and anything else is one record.
/// The parsed document is the page result. An empty body yields nothing and no
/// page result.
#[derive(Debug, Clone, Default)]
pub struct JsonTransform {
    record_path: Option<String>,
    buffer: Vec<u8>,
}

impl JsonTransform {
    /// Create a new JSON transform
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a JSON transform with a record path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            record_path: Some(path.into()),
            buffer: Vec::new(),
        }
    }

    fn records(&self, document: &Value) -> Result<Vec<Value>> {
        let selected = match self.record_path.as_deref() {
            Some(path) if is_wildcard(path) => return select_all(document, path),
            Some(path) => select_path(document, path),
            None => Some(document),
        };

        Ok(match selected {
            Some(Value::Array(items)) => items.clone(),
            Some(value) => vec![value.clone()],
            None => Vec::new(),
        })
    }
}

impl Transform for JsonTransform {
    fn push(&mut self, chunk: Bytes, _output: &mut Vec<Chunk>) -> Result<()> {
        self.buffer.extend_from_slice(&chunk);
        Ok(())
    }

    fn finish(&mut self, output: &mut Vec<Chunk>) -> Result<Option<Value>> {
        let body = std::mem::take(&mut self.buffer);
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let document: Value = serde_json::from_slice(&body)
            .map_err(|e| Error::transform(format!("Failed to parse JSON: {e}")))?;

        output.extend(self.records(&document)?.into_iter().map(Chunk::Object));
        Ok(Some(document))
    }
}

// ============================================================================
// JSON Lines
// ============================================================================

/// Emits one object per non-blank line; page result is `{"records": n}`
#[derive(Debug, Clone, Default)]
pub struct JsonLinesTransform {
    partial: Vec<u8>,
    line: usize,
    records: usize,
}

impl JsonLinesTransform {
    /// Create a new JSONL transform
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_line(&mut self, raw: &[u8], output: &mut Vec<Chunk>) -> Result<()> {
        self.line += 1;
        let text = trim_line(raw);
        if text.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let value: Value = serde_json::from_slice(text).map_err(|e| {
            Error::transform(format!("Failed to parse JSONL at line {}: {e}", self.line))
        })?;

        self.records += 1;
        output.push(Chunk::Object(value));
        Ok(())
    }
}

impl Transform for JsonLinesTransform {
    fn push(&mut self, chunk: Bytes, output: &mut Vec<Chunk>) -> Result<()> {
        self.partial.extend_from_slice(&chunk);

        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.parse_line(&line, output)?;
        }
        Ok(())
    }

    fn finish(&mut self, output: &mut Vec<Chunk>) -> Result<Option<Value>> {
        let rest = std::mem::take(&mut self.partial);
        if !rest.is_empty() {
            self.parse_line(&rest, output)?;
        }
        Ok(Some(json!({ "records": self.records })))
    }
}

// ============================================================================
// Lines
// ============================================================================

/// Re-chunks a byte body on line boundaries; page result is `{"lines": n}`
#[derive(Debug, Clone, Default)]
pub struct LinesTransform {
    partial: Vec<u8>,
    lines: usize,
}

impl LinesTransform {
    /// Create a new line splitting transform
    pub fn new() -> Self {
        Self::default()
    }

    fn emit(&mut self, raw: &[u8], output: &mut Vec<Chunk>) {
        self.lines += 1;
        output.push(Chunk::Bytes(Bytes::copy_from_slice(trim_line(raw))));
    }
}

impl Transform for LinesTransform {
    fn push(&mut self, chunk: Bytes, output: &mut Vec<Chunk>) -> Result<()> {
        self.partial.extend_from_slice(&chunk);

        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.emit(&line, output);
        }
        Ok(())
    }

    fn finish(&mut self, output: &mut Vec<Chunk>) -> Result<Option<Value>> {
        let rest = std::mem::take(&mut self.partial);
        if !rest.is_empty() {
            self.emit(&rest, output);
        }
        Ok(Some(json!({ "lines": self.lines })))
    }
}

/// Strip a trailing `\n` or `\r\n`
fn trim_line(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

// ============================================================================
// Path Selection
// ============================================================================

/// Wildcards go through jsonpath-rust; negative indexes only work in [`select_path`]
fn is_wildcard(path: &str) -> bool {
    path.contains('*') && !path.contains("[-")
}

/// Evaluate a JSONPath with wildcards (`$.data[*].attrs`), one record per match
pub fn select_all(value: &Value, path: &str) -> Result<Vec<Value>> {
    use jsonpath_rust::JsonPath;

    let path = if path.starts_with('$') {
        path.to_string()
    } else {
        format!("$.{path}")
    };
    let query = JsonPath::try_from(path.as_str())
        .map_err(|e| Error::transform(format!("Invalid JSONPath `{path}`: {e}")))?;

    match query.find(value) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Ok(vec![other]),
    }
}

/// Look up a dotted path (`$.data.items`, `items[0].id`, `items[-1]`) in a value
pub fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    if path.is_empty() || path == "$" {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        match part.find('[') {
            Some(bracket) => {
                let name = &part[..bracket];
                let index = part[bracket + 1..].strip_suffix(']')?;

                if !name.is_empty() {
                    current = current.get(name)?;
                }

                let items = current.as_array()?;
                let index: i64 = index.parse().ok()?;
                let index = if index < 0 {
                    items.len().checked_sub(index.unsigned_abs() as usize)?
                } else {
                    index as usize
                };
                current = items.get(index)?;
            }
            None => current = current.get(part)?,
        }
    }

    Some(current)
}
