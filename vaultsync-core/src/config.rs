//! Layered configuration.
//!
//! # Precedence (lowest → highest)
//!
//! 1. YAML file: `--config <path>` or `<config_dir>/vaultsync/config.yaml`
//! 2. Environment: `VAULTSYNC_VAULT`, `VAULTSYNC_REPO`
//! 3. Command-line flags
//!
//! Every layer is a [`ConfigFile`] (all keys optional); layers are merged with
//! [`ConfigFile::merge`] and then resolved into a validated [`Config`].
//!
//! # API pattern
//!
//! Path helpers come in two forms, as elsewhere in the workspace:
//! - `fn_at(dir: &Path, …)`: explicit base directory; used in tests with `TempDir`
//! - `fn(…)`: derives the base from `dirs`, delegates to `_at`

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, ConfigError};

pub const ENV_VAULT: &str = "VAULTSYNC_VAULT";
pub const ENV_REPO: &str = "VAULTSYNC_REPO";

pub const DEFAULT_CONTENT_DIR: &str = "content/docs";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_ASSET_GRACE_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

const STATE_FILE: &str = "state.json";

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// Output style for resolved cross-references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkFormat {
    /// `[text]({{< relref "docs/guides/seo" >}})`
    #[default]
    Relref,
    /// `[text](/docs/guides/seo/)`
    Md,
}

/// Rendering of a cross-reference whose target is not published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnpublishedLink {
    /// Plain display text.
    #[default]
    Text,
    /// Display text linked to `#`.
    Hash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkFormat::Relref => write!(f, "relref"),
            LinkFormat::Md => write!(f, "md"),
        }
    }
}

impl FromStr for LinkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relref" => Ok(LinkFormat::Relref),
            "md" => Ok(LinkFormat::Md),
            other => Err(format!("unknown link format '{other}'; expected: relref, md")),
        }
    }
}

impl fmt::Display for UnpublishedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpublishedLink::Text => write!(f, "text"),
            UnpublishedLink::Hash => write!(f, "hash"),
        }
    }
}

impl FromStr for UnpublishedLink {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(UnpublishedLink::Text),
            "hash" => Ok(UnpublishedLink::Hash),
            other => Err(format!(
                "unknown unpublished link style '{other}'; expected: text, hash"
            )),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{other}'; expected: debug, info, warn, error"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// 1. Raw layer
// ---------------------------------------------------------------------------

/// One configuration layer. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_weight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_format: Option<LinkFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unpublished_link: Option<UnpublishedLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_grace_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<LogLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Load a config file that must exist.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load a config file, treating a missing file as an empty layer.
    pub fn load_optional_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_at(path)
    }

    /// Environment layer from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Environment layer from an arbitrary lookup (tests inject a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            vault: non_empty(ENV_VAULT).map(PathBuf::from),
            repo: non_empty(ENV_REPO).map(PathBuf::from),
            ..Self::default()
        }
    }

    /// Overlay `over` on top of `self`: every key set in `over` wins.
    pub fn merge(self, over: ConfigFile) -> ConfigFile {
        ConfigFile {
            vault: over.vault.or(self.vault),
            repo: over.repo.or(self.repo),
            content_dir: over.content_dir.or(self.content_dir),
            auto_weight: over.auto_weight.or(self.auto_weight),
            link_format: over.link_format.or(self.link_format),
            unpublished_link: over.unpublished_link.or(self.unpublished_link),
            interval: over.interval.or(self.interval),
            settle_delay: over.settle_delay.or(self.settle_delay),
            asset_grace_period: over.asset_grace_period.or(self.asset_grace_period),
            log_level: over.log_level.or(self.log_level),
            dry_run: over.dry_run.or(self.dry_run),
            cache_dir: over.cache_dir.or(self.cache_dir),
        }
    }

    /// Atomically write this layer as YAML.
    ///
    /// Write flow: serialize → `.yaml.tmp` sibling → `rename`.
    pub fn save_at(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let yaml = serde_yaml::to_string(self)?;
        let tmp = path.with_extension("yaml.tmp");
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 2. Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Source tree root.
    pub vault: PathBuf,
    /// Output repository root.
    pub repo: PathBuf,
    /// Output content directory, relative to `repo`.
    pub content_dir: PathBuf,
    pub auto_weight: bool,
    pub link_format: LinkFormat,
    pub unpublished_link: UnpublishedLink,
    /// Periodic tick.
    pub interval: Duration,
    pub settle_delay: Duration,
    pub asset_grace_period: Duration,
    pub log_level: LogLevel,
    pub dry_run: bool,
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Resolve a merged layer into a [`Config`], applying defaults.
    ///
    /// Does not touch the filesystem; see [`Config::validate`].
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let vault = file.vault.ok_or(ConfigError::Missing {
            key: "vault",
            env: ENV_VAULT,
        })?;
        let repo = file.repo.ok_or(ConfigError::Missing {
            key: "repo",
            env: ENV_REPO,
        })?;

        Ok(Config {
            vault,
            repo,
            content_dir: file
                .content_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR)),
            auto_weight: file.auto_weight.unwrap_or(true),
            link_format: file.link_format.unwrap_or_default(),
            unpublished_link: file.unpublished_link.unwrap_or_default(),
            interval: duration_or("interval", file.interval.as_deref(), DEFAULT_INTERVAL)?,
            settle_delay: duration_or(
                "settle_delay",
                file.settle_delay.as_deref(),
                DEFAULT_SETTLE_DELAY,
            )?,
            asset_grace_period: duration_or(
                "asset_grace_period",
                file.asset_grace_period.as_deref(),
                DEFAULT_ASSET_GRACE_PERIOD,
            )?,
            log_level: file.log_level.unwrap_or_default(),
            dry_run: file.dry_run.unwrap_or(false),
            cache_dir: file.cache_dir,
        })
    }

    /// Check startup invariants and canonicalize both roots.
    ///
    /// Missing roots are fatal: no pass may run against a tree that is not there.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.vault = existing_dir("vault", &self.vault)?;
        self.repo = existing_dir("repo", &self.repo)?;

        if self.content_dir.is_absolute() || self.content_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                key: "content_dir",
                message: format!(
                    "must be a non-empty path relative to the repo, got {}",
                    self.content_dir.display()
                ),
            });
        }
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::Invalid {
                key: "interval",
                message: format!("must be at least 1s, got {}", format_duration(self.interval)),
            });
        }
        Ok(self)
    }

    /// `<repo>/<content_dir>`
    pub fn content_root(&self) -> PathBuf {
        self.repo.join(&self.content_dir)
    }

    /// Binds the state store to this vault: first 16 hex digits of SHA-256
    /// over the absolute vault path.
    pub fn origin_tag(&self) -> String {
        let absolute = std::fs::canonicalize(&self.vault).unwrap_or_else(|_| self.vault.clone());
        let mut hasher = Sha256::new();
        hasher.update(absolute.to_string_lossy().as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }

    /// `<cache_dir or dirs::cache_dir()/vaultsync>/<origin-tag>/state.json`
    pub fn state_file(&self) -> Result<PathBuf, ConfigError> {
        let base = match &self.cache_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir()
                .ok_or(ConfigError::DirNotFound("cache"))?
                .join("vaultsync"),
        };
        Ok(state_file_at(&base, &self.origin_tag()))
    }

    /// Back to a layer with every key set: used by `vaultsync config show`.
    pub fn to_file(&self) -> ConfigFile {
        ConfigFile {
            vault: Some(self.vault.clone()),
            repo: Some(self.repo.clone()),
            content_dir: Some(self.content_dir.clone()),
            auto_weight: Some(self.auto_weight),
            link_format: Some(self.link_format),
            unpublished_link: Some(self.unpublished_link),
            interval: Some(format_duration(self.interval)),
            settle_delay: Some(format_duration(self.settle_delay)),
            asset_grace_period: Some(format_duration(self.asset_grace_period)),
            log_level: Some(self.log_level),
            dry_run: Some(self.dry_run),
            cache_dir: self.cache_dir.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Loading
// ---------------------------------------------------------------------------

/// `<config_home>/vaultsync/config.yaml`: pure, no I/O.
pub fn default_config_path_at(config_home: &Path) -> PathBuf {
    config_home.join("vaultsync").join("config.yaml")
}

/// `default_config_path_at` convenience wrapper.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::config_dir().ok_or(ConfigError::DirNotFound("config"))?;
    Ok(default_config_path_at(&home))
}

/// `<base>/<origin_tag>/state.json`: pure, no I/O.
pub fn state_file_at(base: &Path, origin_tag: &str) -> PathBuf {
    base.join(origin_tag).join(STATE_FILE)
}

/// Load every layer, merge, resolve and validate.
///
/// `explicit` must exist when given; the default location may be absent.
pub fn load_with(
    explicit: Option<&Path>,
    env: ConfigFile,
    flags: ConfigFile,
) -> Result<Config, ConfigError> {
    let file = match explicit {
        Some(path) => ConfigFile::load_at(path)?,
        None => ConfigFile::load_optional_at(&default_config_path()?)?,
    };
    Config::from_file(file.merge(env).merge(flags))?.validate()
}

/// `load_with` using the process environment.
pub fn load(explicit: Option<&Path>, flags: ConfigFile) -> Result<Config, ConfigError> {
    load_with(explicit, ConfigFile::from_env(), flags)
}

// ---------------------------------------------------------------------------
// 4. Durations
// ---------------------------------------------------------------------------

/// Parse `<n>ms|s|m|h|d`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = value.split_at(split);
    let n: u64 = digits.parse().ok()?;
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n.checked_mul(60)?),
        "h" => Duration::from_secs(n.checked_mul(60 * 60)?),
        "d" => Duration::from_secs(n.checked_mul(24 * 60 * 60)?),
        _ => return None,
    };
    Some(duration)
}

/// Inverse of [`parse_duration`], choosing the largest exact unit.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs();
    for (unit, size) in [("d", 24 * 60 * 60), ("h", 60 * 60), ("m", 60)] {
        if secs != 0 && secs % size == 0 {
            return format!("{}{unit}", secs / size);
        }
    }
    format!("{secs}s")
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn duration_or(
    key: &'static str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => parse_duration(raw).ok_or_else(|| ConfigError::Duration {
            key,
            value: raw.to_string(),
        }),
    }
}

fn existing_dir(role: &'static str, path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.is_dir() {
        return Err(ConfigError::RootMissing {
            role,
            path: path.to_path_buf(),
        });
    }
    std::fs::canonicalize(path).map_err(|e| io_err(path, e))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
