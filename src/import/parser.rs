//! Splitting input bodies into numbered JSON lines

use crate::error::{KilnError, Result};
use serde_json::Value;

/// One non-blank input line after JSON parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based position in the input, counting blank lines
    pub line_number: usize,

    /// The parsed value, or the parser's message
    pub parsed: std::result::Result<Value, String>,
}

/// Parse newline-delimited JSON, skipping blank lines
pub fn parse_lines(content: &str) -> impl Iterator<Item = ParsedLine> + '_ {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| ParsedLine {
            line_number: i + 1,
            parsed: serde_json::from_str(line.trim()).map_err(|e| e.to_string()),
        })
}

/// Turn a JSON body into newline-delimited JSON
///
/// A top-level array yields one line per element; any other value yields a
/// single line. Object key order is kept.
pub fn json_body_to_lines(body: &mut [u8]) -> Result<String> {
    let value: Value = simd_json::serde::from_slice(body)
        .map_err(|e| KilnError::InvalidInput(format!("body is not valid JSON: {}", e)))?;

    match value {
        Value::Array(items) => {
            let lines = items
                .iter()
                .map(serde_json::to_string)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(lines.join("\n"))
        }
        other => Ok(serde_json::to_string(&other)?),
    }
}
