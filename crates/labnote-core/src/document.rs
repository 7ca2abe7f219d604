//! Note front matter.
//!
//! A note may start with a YAML block delimited by `---` lines. Values are
//! read through `serde_yaml`; writes edit the block line by line so the rest
//! of the note is left byte-for-byte intact.

use serde_yaml::{Mapping, Value};

use crate::error::Result;

/// Line span of the front-matter block (opening and closing fence included).
fn block_span(lines: &[&str]) -> Option<(usize, usize)> {
    if lines.first().map(|l| l.trim_end()) != Some("---") {
        return None;
    }
    let close = lines
        .iter()
        .skip(1)
        .position(|l| matches!(l.trim_end(), "---" | "..."))?;
    Some((0, close + 1))
}

/// Parse the front matter. `Ok(None)` when the note has none.
pub fn front_matter(text: &str) -> Result<Option<Mapping>> {
    let lines: Vec<&str> = text.lines().collect();
    let Some((open, close)) = block_span(&lines) else {
        return Ok(None);
    };
    let body = lines[open + 1..close].join("\n");
    if body.trim().is_empty() {
        return Ok(Some(Mapping::new()));
    }
    Ok(Some(serde_yaml::from_str(&body)?))
}

/// Scalar front-matter value rendered as a string.
pub fn front_matter_value(text: &str, key: &str) -> Result<Option<String>> {
    let Some(mapping) = front_matter(text)? else {
        return Ok(None);
    };
    Ok(match mapping.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Set `key` to `value`, replacing an existing top-level entry or appending
/// one. A note without front matter gets a new block.
pub fn set_front_matter_value(text: &str, key: &str, value: &str) -> Result<String> {
    let rendered = serde_yaml::to_string(&Value::String(value.to_string()))?;
    let entry = format!("{}: {}", key, rendered.trim_end());

    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();

    match block_span(&borrowed) {
        Some((open, close)) => {
            let prefix = format!("{}:", key);
            let existing = (open + 1..close).find(|&i| lines[i].starts_with(&prefix));
            match existing {
                Some(i) => lines[i] = entry,
                None => lines.insert(close, entry),
            }
        }
        None => {
            lines.splice(0..0, ["---".to_string(), entry, "---".to_string()]);
        }
    }

    let mut out = lines.join(newline);
    if text.ends_with('\n') || text.is_empty() {
        out.push_str(newline);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_animal() {
        let text = "---\nanimal: M001\ndepth: 300\n---\n# Session\n";
        assert_eq!(
            front_matter_value(text, "animal").unwrap().as_deref(),
            Some("M001")
        );
        assert_eq!(
            front_matter_value(text, "depth").unwrap().as_deref(),
            Some("300")
        );
        assert_eq!(front_matter_value(text, "missing").unwrap(), None);
    }

    #[test]
    fn test_no_front_matter() {
        assert!(front_matter("# Title\n---\n").unwrap().is_none());
        assert_eq!(front_matter_value("plain", "animal").unwrap(), None);
    }

    #[test]
    fn test_unclosed_block_is_not_front_matter() {
        assert!(front_matter("---\nanimal: M001\n").unwrap().is_none());
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(front_matter("---\nanimal: [M001\n---\n").is_err());
    }

    #[test]
    fn test_replace_existing_key() {
        let text = "---\nanimal: M001\ntags: [a]\n---\nbody\n";
        let out = set_front_matter_value(text, "animal", "M002").unwrap();
        assert_eq!(out, "---\nanimal: M002\ntags: [a]\n---\nbody\n");
    }

    #[test]
    fn test_append_key_to_block() {
        let text = "---\nanimal: M001\n---\nbody";
        let out = set_front_matter_value(text, "last_export", "2024-03-05 10:00").unwrap();
        assert!(out.starts_with("---\nanimal: M001\nlast_export: "));
        assert!(out.ends_with("---\nbody"));
        assert_eq!(
            front_matter_value(&out, "last_export").unwrap().as_deref(),
            Some("2024-03-05 10:00")
        );
    }

    #[test]
    fn test_create_block() {
        let out = set_front_matter_value("# Title\n", "animal", "M001").unwrap();
        assert_eq!(out, "---\nanimal: M001\n---\n# Title\n");
    }

    #[test]
    fn test_value_needing_quotes_round_trips() {
        let out = set_front_matter_value("", "animal", "M:01 #x").unwrap();
        assert_eq!(
            front_matter_value(&out, "animal").unwrap().as_deref(),
            Some("M:01 #x")
        );
    }
}
