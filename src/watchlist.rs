//! The list of cubes to poll.
//!
//! A watchlist file is JSON in one of three shapes:
//!
//! ```json
//! ["ZH123456", "ZH654321"]
//! {"cube_list": ["ZH123456", "ZH654321"]}
//! {"ZH123456": "a note", "ZH654321": {"anything": true}}
//! ```
//!
//! Cubes are polled in file order, keys included. Entries that do not start
//! with `ZH` are dropped. Entries that start with `ZH` but are otherwise
//! malformed are kept so the poll reports them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;
use crate::cube::CubeId;

const CUBE_PREFIX: &str = "ZH";

fn entry_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract cube ids from a decoded watchlist document.
pub fn parse_watchlist(document: &Value) -> Result<Vec<CubeId>> {
    let raw: Vec<String> = match document {
        Value::Array(items) => items.iter().filter_map(entry_text).collect(),
        Value::Object(map) => match map.get("cube_list") {
            Some(Value::Array(items)) => items.iter().filter_map(entry_text).collect(),
            Some(_) => anyhow::bail!("\"cube_list\" must be an array"),
            None => map.keys().map(|key| key.trim().to_string()).collect(),
        },
        _ => anyhow::bail!("Watchlist must be a JSON array or object"),
    };

    Ok(dedup_cubes(raw.into_iter().filter_map(|entry| {
        let id = CubeId::new(entry);
        id.as_str().starts_with(CUBE_PREFIX).then_some(id)
    })))
}

/// Read a watchlist file.
pub fn load_watchlist(path: &Path) -> Result<Vec<CubeId>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read watchlist: {}", path.display()))?;
    let document: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse watchlist: {}", path.display()))?;
    parse_watchlist(&document).with_context(|| format!("Invalid watchlist: {}", path.display()))
}

/// Inline `cubes` followed by the watchlist file, without duplicates.
pub fn configured_cubes(config: &Config) -> Result<Vec<CubeId>> {
    let mut cubes = config.cubes.clone();
    if let Some(path) = &config.watchlist {
        cubes.extend(load_watchlist(path)?);
    }
    Ok(dedup_cubes(cubes))
}

fn dedup_cubes(cubes: impl IntoIterator<Item = CubeId>) -> Vec<CubeId> {
    let mut seen = HashSet::new();
    cubes
        .into_iter()
        .filter(|id| !id.as_str().is_empty() && seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(raw: &[&str]) -> Vec<CubeId> {
        raw.iter().map(|s| CubeId::new(*s)).collect()
    }

    #[test]
    fn reads_array_shape() -> Result<()> {
        let cubes = parse_watchlist(&json!(["ZH123456", " zh654321 ", "SH000300", ""]))?;
        assert_eq!(cubes, ids(&["ZH123456", "ZH654321"]));
        assert!(cubes.iter().all(CubeId::is_well_formed));
        Ok(())
    }

    #[test]
    fn reads_cube_list_shape() -> Result<()> {
        let cubes = parse_watchlist(&json!({"cube_list": ["ZH123456", "ZH123456", 42]}))?;
        assert_eq!(cubes, ids(&["ZH123456"]));
        Ok(())
    }

    #[test]
    fn reads_keys_shape() -> Result<()> {
        let document: Value =
            serde_json::from_str(r#"{"ZH222222": "b", "note": "c", "ZH111111": {}}"#)?;
        let cubes = parse_watchlist(&document)?;
        assert_eq!(cubes, ids(&["ZH222222", "ZH111111"]));
        Ok(())
    }

    #[test]
    fn keeps_malformed_zh_entries() -> Result<()> {
        let cubes = parse_watchlist(&json!(["ZH12"]))?;
        assert_eq!(cubes, ids(&["ZH12"]));
        assert!(!cubes[0].is_well_formed());
        Ok(())
    }

    #[test]
    fn rejects_scalar_documents() {
        assert!(parse_watchlist(&json!("ZH123456")).is_err());
        assert!(parse_watchlist(&json!({"cube_list": "ZH123456"})).is_err());
    }
}
