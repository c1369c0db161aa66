//! Exclusion list file: one driver id per line, `#` starts a comment

use crate::domain::types::ExclusionList;
use anyhow::Context;
use std::path::Path;
use tracing::{info, warn};

pub fn parse_exclusions(content: &str) -> ExclusionList {
    ExclusionList::new(
        content
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty()),
    )
}

/// Load the exclusion list. No path or a missing file yields an empty list.
pub fn load_exclusions(path: Option<&str>) -> anyhow::Result<ExclusionList> {
    let Some(path) = path else {
        return Ok(ExclusionList::default());
    };
    if !Path::new(path).exists() {
        warn!(path = %path, "exclusions_file_not_found");
        return Ok(ExclusionList::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read exclusions file {}", path))?;
    let list = parse_exclusions(&content);
    info!(path = %path, drivers = %list.len(), "exclusions_loaded");
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_exclusions() {
        let list = parse_exclusions("# retired drivers\nA\n\n  B  \nC # on leave\n");
        assert_eq!(list.len(), 3);
        assert!(list.contains("A"));
        assert!(list.contains("B"));
        assert!(list.contains("C"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        assert!(load_exclusions(None).unwrap().is_empty());
        assert!(load_exclusions(Some("/nonexistent/exclusions.txt")).unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"D1\nD2\n").unwrap();
        file.flush().unwrap();

        let list = load_exclusions(file.path().to_str()).unwrap();
        assert!(list.contains("D2"));
    }
}
