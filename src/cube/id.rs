use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid cube id {value:?}: expected ZH followed by 6 or 7 digits")]
pub struct CubeIdError {
    value: String,
}

fn cube_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^ZH\d{6,7}$").expect("cube id pattern is valid"))
}

/// Cube symbol such as `ZH123456`.
///
/// Always stored uppercase and otherwise as given; surrounding whitespace
/// makes the id malformed. Construction never fails so that a malformed id
/// can still be reported back as such; use [`CubeId::parse`] when a
/// well-formed id is required up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CubeId(String);

impl CubeId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().to_uppercase())
    }

    /// Normalize and validate in one step.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CubeIdError> {
        let id = Self::new(raw);
        if id.is_well_formed() {
            Ok(id)
        } else {
            Err(CubeIdError { value: id.0 })
        }
    }

    pub fn is_well_formed(&self) -> bool {
        cube_id_pattern().is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CubeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CubeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for CubeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<CubeId> for String {
    fn from(value: CubeId) -> Self {
        value.0
    }
}
