//! Validated record paths.

use crate::error::{MiglockError, Result};
use std::fmt;

/// A slash-separated record key such as `default/migrations/_lock`.
///
/// Segments are non-empty, are not `.` or `..`, and contain only ASCII
/// letters, digits, `_`, `-` and `.`. Leading and trailing slashes are
/// dropped. The same key maps cleanly onto a KV key or a relative file path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(String);

impl StorePath {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(MiglockError::UserError(format!(
                "invalid store path '{}': path is empty",
                raw
            )));
        }

        for segment in trimmed.split('/') {
            validate_segment(raw, segment)?;
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Build `<namespace>/<subpath>`.
    pub fn join(namespace: &str, subpath: &str) -> Result<Self> {
        let namespace = namespace.trim().trim_matches('/');
        let subpath = subpath.trim().trim_matches('/');
        if namespace.is_empty() {
            return Err(MiglockError::UserError(
                "invalid store path: namespace is empty".to_string(),
            ));
        }
        Self::parse(&format!("{}/{}", namespace, subpath))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

fn validate_segment(raw: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(MiglockError::UserError(format!(
            "invalid store path '{}': empty segment",
            raw
        )));
    }
    if segment == "." || segment == ".." {
        return Err(MiglockError::UserError(format!(
            "invalid store path '{}': relative segment '{}'",
            raw, segment
        )));
    }
    if let Some(bad) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(MiglockError::UserError(format!(
            "invalid store path '{}': unsupported character '{}'",
            raw, bad
        )));
    }
    Ok(())
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
