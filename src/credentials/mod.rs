//! Where the xueqiu session token comes from.
//!
//! The token is an opaque `Cookie` header value. Obtaining it (logging in,
//! solving the captcha) happens outside this crate; here it is only read.
//!
//! # Configuration
//!
//! ```toml
//! [token]
//! backend = "file"
//! path = "token.txt"
//! ```
//!
//! Other backends: `env` (`var = "XUEQIU_TOKEN"`) and `session` (`path` to a
//! browser session export, see [`SessionData`]).

mod session;

pub use session::SessionData;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Environment variable read when no `[token]` section is configured.
pub const DEFAULT_TOKEN_ENV: &str = "XUEQIU_TOKEN";

/// Sessions older than this are reported, since xueqiu expires them.
const SESSION_WARN_AGE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum TokenConfig {
    /// A file holding the raw cookie string.
    File { path: PathBuf },
    /// An environment variable holding the raw cookie string.
    Env {
        #[serde(default = "default_token_env")]
        var: String,
    },
    /// A JSON browser session export.
    Session { path: PathBuf },
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig::Env {
            var: default_token_env(),
        }
    }
}

impl TokenConfig {
    /// Resolve relative file paths against `base_dir`.
    pub fn resolve_paths(self, base_dir: &Path) -> Self {
        let resolve = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };
        match self {
            TokenConfig::File { path } => TokenConfig::File {
                path: resolve(path),
            },
            TokenConfig::Session { path } => TokenConfig::Session {
                path: resolve(path),
            },
            env @ TokenConfig::Env { .. } => env,
        }
    }

    /// Read the token.
    pub fn load(&self) -> Result<SecretString> {
        let token = match self {
            TokenConfig::File { path } => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read token file: {}", path.display()))?
                .trim()
                .to_string(),
            TokenConfig::Env { var } => std::env::var(var)
                .with_context(|| format!("Token environment variable {var} is not set"))?
                .trim()
                .to_string(),
            TokenConfig::Session { path } => {
                let session = SessionData::load(path)?;
                if let Some(age) = session.age(Utc::now()) {
                    if age.num_days() > SESSION_WARN_AGE_DAYS {
                        tracing::warn!(
                            path = %path.display(),
                            age_days = age.num_days(),
                            "session export is old; xueqiu may reject it"
                        );
                    }
                }
                session.cookie_header()
            }
        };

        if token.is_empty() {
            anyhow::bail!("Token is empty ({})", self.describe());
        }
        Ok(SecretString::from(token))
    }

    pub fn describe(&self) -> String {
        match self {
            TokenConfig::File { path } => format!("file {}", path.display()),
            TokenConfig::Env { var } => format!("env {var}"),
            TokenConfig::Session { path } => format!("session {}", path.display()),
        }
    }
}
