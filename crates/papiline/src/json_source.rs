//! JSON document loading with parse diagnostics
//!
//! Rule trees, converter rule sets and environment files are hand-edited
//! JSON, so parse failures must point at the broken spot. [locate] maps a
//! byte offset back to a line/column pair; [load_file] and [parse_str] wrap
//! `serde_json` failures into a [JsonLoadError::Parse] whose message has the
//! shape `<prefix>, <file>, line: <line>, position: <column>`.
use serde::de::DeserializeOwned;
use std::path::Path;

/// Zero-based line and column of a byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// Map a byte offset in `text` to its line and column
///
/// Offsets past the end of `text` (truncated input) clamp to the last line,
/// column 0.
pub fn locate(text: &str, offset: usize) -> Location {
    if offset > text.len() {
        let line = text.bytes().filter(|byte| *byte == b'\n').count();
        return Location { line, column: 0 };
    }

    let mut line = 0;
    let mut line_start = 0;
    for (index, byte) in text.bytes().enumerate().take(offset) {
        if byte == b'\n' {
            line += 1;
            line_start = index + 1;
        }
    }

    Location {
        line,
        column: offset - line_start,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum JsonLoadError {
    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("{prefix}, {file}, line: {line}, position: {position}")]
    Parse {
        prefix: String,
        file: String,
        /// one-based line for display
        line: usize,
        /// one-based column for display, 0 for truncated input
        position: usize,
    },
}

/// Parse `text` as `T`, attributing failures to `origin`
pub fn parse_str<T: DeserializeOwned>(text: &str, origin: &Path) -> Result<T, JsonLoadError> {
    serde_json::from_str(text).map_err(|err| located(err, origin, text))
}

/// Read and parse a JSON file
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, JsonLoadError> {
    tracing::info!(path=%path.display(), "loading file");

    let text = std::fs::read_to_string(path)?;
    parse_str(&text, path)
}

fn located(err: serde_json::Error, origin: &Path, text: &str) -> JsonLoadError {
    let (prefix, line, position) = match err.classify() {
        serde_json::error::Category::Eof => {
            let location = locate(text, text.len() + 1);
            ("Unexpected end of JSON input", location.line + 1, 0)
        }
        serde_json::error::Category::Data => {
            let location = locate(text, offset_of(text, err.line(), err.column()));
            ("Invalid JSON data", location.line + 1, location.column + 1)
        }
        _ => {
            let location = locate(text, offset_of(text, err.line(), err.column()));
            (
                "Unexpected token in JSON",
                location.line + 1,
                location.column + 1,
            )
        }
    };

    JsonLoadError::Parse {
        prefix: prefix.to_string(),
        file: origin.display().to_string(),
        line,
        position,
    }
}

/// Byte offset of a one-based line/column pair as reported by `serde_json`
fn offset_of(text: &str, line: usize, column: usize) -> usize {
    let mut line_start = 0;
    let mut remaining = line.saturating_sub(1);

    for (index, byte) in text.bytes().enumerate() {
        if remaining == 0 {
            break;
        }
        if byte == b'\n' {
            remaining -= 1;
            line_start = index + 1;
        }
    }

    line_start + column.saturating_sub(1)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn locate_walks_newlines() {
        let text = "ab\ncd\nef";
        assert_eq!(locate(text, 0), Location { line: 0, column: 0 });
        assert_eq!(locate(text, 4), Location { line: 1, column: 1 });
        assert_eq!(locate(text, 6), Location { line: 2, column: 0 });
    }

    #[test]
    fn locate_clamps_past_the_end() {
        let text = "ab\ncd";
        assert_eq!(locate(text, 99), Location { line: 1, column: 0 });
    }

    #[test]
    fn stray_token_is_reported_with_line_and_position() {
        let text = "{\n  \"a\": 1,\n  \"b\": {\n    \"c\": true\n  },\n  \"d\": null\n}\n }\n";
        let err = parse_str::<Value>(text, Path::new("broken.json")).unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Unexpected token in JSON"), "{message}");
        assert!(message.contains("broken.json"), "{message}");
        assert!(message.ends_with("line: 8, position: 2"), "{message}");
    }

    #[test]
    fn truncated_input_reports_the_trailing_line() {
        let text = "{\n  \"a\": [1,\n";
        let err = parse_str::<Value>(text, Path::new("truncated.json")).unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("Unexpected end of"), "{message}");
        assert!(message.ends_with("line: 3, position: 0"), "{message}");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_file::<Value>(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, JsonLoadError::Io(_)));
    }
}
