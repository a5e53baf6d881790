//! Session cookies exported from a logged-in browser.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cookie state captured from a browser session.
///
/// Expected JSON format:
/// ```json
/// {
///   "cookie": "xq_a_token=...; u=...",
///   "cookies": { "xq_r_token": "..." },
///   "captured_at": 1717400000
/// }
/// ```
/// Either field may be omitted; both are combined into one `Cookie` header.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Raw `Cookie` header as copied from browser dev tools.
    #[serde(default)]
    pub cookie: Option<String>,

    /// Individual cookies (name -> value).
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// When the session was captured (Unix timestamp, seconds).
    #[serde(default)]
    pub captured_at: Option<i64>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn with_raw_cookie(mut self, header: impl Into<String>) -> Self {
        self.cookie = Some(header.into());
        self
    }

    /// Parse an exported session file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))
    }

    /// Format the session as a `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        let raw = self
            .cookie
            .as_deref()
            .map(|c| c.trim().trim_end_matches(';').trim())
            .filter(|c| !c.is_empty());

        raw.into_iter()
            .map(str::to_string)
            .chain(self.cookies.iter().map(|(k, v)| format!("{k}={v}")))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// How long ago the session was captured, if known.
    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.captured_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|captured| now - captured)
    }
}
