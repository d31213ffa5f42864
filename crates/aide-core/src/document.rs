//! Markdown documents with an optional YAML frontmatter header.
//!
//! ```text
//! ---
//! key: value
//! ---
//! body...
//! ```

use crate::error::{AideError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Split `text` into its raw YAML header (if any) and body.
pub fn split(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let header = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (Some(header), body.strip_prefix('\n').unwrap_or(body));
        }
        offset += line.len();
    }
    (None, text)
}

/// Parse the header of `text` into `H`. `file` is only used for error messages.
pub fn parse<H: DeserializeOwned>(text: &str, file: &str) -> Result<(Option<H>, String)> {
    let (raw, body) = split(text);
    let header = match raw {
        Some(raw) => Some(
            serde_yaml::from_str::<H>(raw).map_err(|e| AideError::MalformedHeader {
                file: file.to_string(),
                reason: e.to_string(),
            })?,
        ),
        None => None,
    };
    Ok((header, body.to_string()))
}

/// Render `header` and `body` back into a document.
pub fn render<H: Serialize>(header: &H, body: &str) -> Result<String> {
    let yaml = serde_yaml::to_string(header)?;
    let mut out = String::with_capacity(yaml.len() + body.len() + 16);
    out.push_str("---\n");
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("---\n\n");
    out.push_str(body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}
