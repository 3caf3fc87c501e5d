//! Configuration of the caching engine
//!
//! Read from a `tessera.toml` file, then overridden by environment variables:
//!
//! - `TESSERA_CACHE_DIR`: root directory of the filesystem store
//! - `TESSERA_CACHE_MODE`: one of `off`, `read`, `write`, `read-write`

use crate::{Error, Result};
use dirs::{cache_dir, home_dir};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "TESSERA_CACHE_DIR";

/// Environment variable overriding the cache mode
pub const CACHE_MODE_ENV: &str = "TESSERA_CACHE_MODE";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TesseraConfig {
    /// Global caching switch; `false` behaves like [`CacheMode::Off`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_enabled: Option<bool>,

    /// Which directions of cache traffic are allowed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_mode: Option<CacheMode>,

    /// Root directory of the filesystem store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Replay captured task logs on cache hits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_logs: Option<bool>,
}

impl TesseraConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text).map_err(|e| match e {
                Error::Configuration { message } => {
                    Error::configuration(format!("{}: {message}", path.display()))
                }
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::storage(e, path, "read")),
        }
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid configuration.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Apply `TESSERA_CACHE_DIR` and `TESSERA_CACHE_MODE`
    ///
    /// # Errors
    ///
    /// Returns error if `TESSERA_CACHE_MODE` holds an unknown mode.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(dir) = non_empty_env(CACHE_DIR_ENV) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(mode) = non_empty_env(CACHE_MODE_ENV) {
            self.cache_mode = Some(mode.parse()?);
        }
        Ok(self)
    }

    /// Mode in effect after applying the global switch
    #[must_use]
    pub fn effective_mode(&self) -> CacheMode {
        if self.cache_enabled == Some(false) {
            return CacheMode::Off;
        }
        self.cache_mode.unwrap_or_default()
    }

    /// Whether captured logs are replayed on cache hits
    #[must_use]
    pub fn replay_logs(&self) -> bool {
        self.replay_logs.unwrap_or(true)
    }

    /// Resolve the root directory of the filesystem store.
    ///
    /// Candidates, first writable wins:
    ///
    /// 1. `cache_dir` from this configuration
    /// 2. `TESSERA_CACHE_DIR`
    /// 3. `XDG_CACHE_HOME/tessera`
    /// 4. OS cache dir`/tessera`
    /// 5. `~/.tessera/cache`
    /// 6. `TMPDIR/tessera/cache`
    ///
    /// # Errors
    ///
    /// Returns error if no candidate is writable.
    pub fn resolve_cache_root(&self) -> Result<PathBuf> {
        cache_root_from_inputs(CacheInputs {
            configured: self.cache_dir.clone(),
            env_cache_dir: non_empty_env(CACHE_DIR_ENV).map(PathBuf::from),
            xdg_cache_home: non_empty_env("XDG_CACHE_HOME").map(PathBuf::from),
            os_cache_dir: cache_dir(),
            home_dir: home_dir(),
            temp_dir: std::env::temp_dir(),
        })
    }
}

/// Which directions of cache traffic are allowed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Never read or write; every call runs the task
    Off,
    /// Reuse stored results but never store new ones
    Read,
    /// Reuse and store
    #[default]
    ReadWrite,
    /// Always run and store, never reuse
    Write,
}

impl CacheMode {
    /// Whether stored results may be reused
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Whether fresh results are stored
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Text form as accepted by [`FromStr`]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Read => "read",
            Self::ReadWrite => "read-write",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "read-write" | "readwrite" => Ok(Self::ReadWrite),
            other => Err(Error::configuration(format!(
                "Unknown cache mode '{other}', expected off, read, write or read-write"
            ))),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone)]
struct CacheInputs {
    configured: Option<PathBuf>,
    env_cache_dir: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    os_cache_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

fn cache_root_from_inputs(inputs: CacheInputs) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    for dir in [inputs.configured, inputs.env_cache_dir]
        .into_iter()
        .flatten()
        .filter(|p| !p.as_os_str().is_empty())
    {
        candidates.push(dir);
    }
    if let Some(xdg) = inputs.xdg_cache_home {
        candidates.push(xdg.join("tessera"));
    }
    if let Some(os_cache) = inputs.os_cache_dir {
        candidates.push(os_cache.join("tessera"));
    }
    if let Some(home) = inputs.home_dir {
        candidates.push(home.join(".tessera/cache"));
    }
    candidates.push(inputs.temp_dir.join("tessera/cache"));

    for path in candidates {
        if path.starts_with("/homeless-shelter") {
            continue;
        }
        // Existing directories may be read-only (e.g. CI caches under $HOME)
        if path.exists() {
            let probe = path.join(".write_probe");
            if std::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&probe)
                .is_ok()
            {
                let _ = std::fs::remove_file(&probe);
                return Ok(path);
            }
            tracing::debug!(path = %path.display(), "Cache directory not writable, trying next");
            continue;
        }
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        }
    }
    Err(Error::configuration(
        "Failed to determine a writable cache directory",
    ))
}
