//! Run configuration and the optimisation registry.
//!
//! Handles loading and validating `optimise-images.toml`, and resolving the
//! effective [`OptimisationConfig`] for one image from its class annotations.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! site_url = ""             # Absolute URL the site is served from
//! create_captions = true    # Wrap titled images in <figure>/<figcaption>
//!
//! [optimisations.default]   # Applied to every image first
//! max_width = 640
//! jpeg_quality = 75
//! webp_quality = 65
//! lossless = "auto"         # "auto" (PNG sources only), true, or false
//!
//! [optimisations.thumb]     # Selected with class="poi-thumb"
//! max_width = 200
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! ## Resolution
//!
//! Registry entries are sparse. An image's configuration starts from the
//! engine defaults, takes the `default` entry on top, then each entry named by
//! a `poi-<key>` class in class order. Only the fields an entry sets are
//! replaced. Unknown keys are skipped.
//!
//! Unknown keys in the file are rejected to catch typos early.

use crate::annotations::ClassAnnotations;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Registry key applied to every image before any selector.
pub const DEFAULT_KEY: &str = "default";

/// Config file name looked up when none is given.
pub const CONFIG_FILENAME: &str = "optimise-images.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

// =============================================================================
// Optimisation settings
// =============================================================================

/// Lossless policy for one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LosslessSetting", into = "LosslessSetting")]
pub enum Lossless {
    /// Lossless iff the source file has a `.png` suffix.
    #[default]
    Auto,
    Always,
    Never,
}

impl Lossless {
    /// The effective flag for `source`.
    pub fn resolve(self, source: &Path) -> bool {
        match self {
            Lossless::Auto => source
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("png")),
            Lossless::Always => true,
            Lossless::Never => false,
        }
    }
}

/// On-disk spelling of [`Lossless`]: `true`, `false`, or `"auto"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LosslessSetting {
    Flag(bool),
    Keyword(String),
}

impl TryFrom<LosslessSetting> for Lossless {
    type Error = String;

    fn try_from(setting: LosslessSetting) -> Result<Self, Self::Error> {
        match setting {
            LosslessSetting::Flag(true) => Ok(Lossless::Always),
            LosslessSetting::Flag(false) => Ok(Lossless::Never),
            LosslessSetting::Keyword(k) if k == "auto" => Ok(Lossless::Auto),
            LosslessSetting::Keyword(k) => {
                Err(format!("lossless must be true, false or \"auto\", got \"{k}\""))
            }
        }
    }
}

impl From<Lossless> for LosslessSetting {
    fn from(lossless: Lossless) -> Self {
        match lossless {
            Lossless::Auto => LosslessSetting::Keyword("auto".to_string()),
            Lossless::Always => LosslessSetting::Flag(true),
            Lossless::Never => LosslessSetting::Flag(false),
        }
    }
}

/// Fully resolved settings for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimisationConfig {
    /// Derivatives are scaled down to at most this width.
    pub max_width: u32,
    /// JPEG quality (0-100) for the lossy compatible file.
    pub jpeg_quality: u32,
    /// WebP quality (0-100).
    pub webp_quality: u32,
    pub lossless: Lossless,
}

impl Default for OptimisationConfig {
    fn default() -> Self {
        Self {
            max_width: 640,
            jpeg_quality: 75,
            webp_quality: 65,
            lossless: Lossless::Auto,
        }
    }
}

impl OptimisationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_width == 0 {
            return Err(ConfigError::Validation("max_width must be positive".into()));
        }
        if self.jpeg_quality > 100 {
            return Err(ConfigError::Validation("jpeg_quality must be 0-100".into()));
        }
        if self.webp_quality > 100 {
            return Err(ConfigError::Validation("webp_quality must be 0-100".into()));
        }
        Ok(())
    }
}

/// A sparse registry entry: only the fields it sets are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimisationOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_quality: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webp_quality: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lossless: Option<Lossless>,
}

impl OptimisationOverride {
    /// Shallow-merge the fields this entry sets over `base`.
    pub fn apply_to(&self, base: &mut OptimisationConfig) {
        if let Some(v) = self.max_width {
            base.max_width = v;
        }
        if let Some(v) = self.jpeg_quality {
            base.jpeg_quality = v;
        }
        if let Some(v) = self.webp_quality {
            base.webp_quality = v;
        }
        if let Some(v) = self.lossless {
            base.lossless = v;
        }
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        let mut probe = OptimisationConfig::default();
        self.apply_to(&mut probe);
        probe.validate().map_err(|e| match e {
            ConfigError::Validation(msg) => {
                ConfigError::Validation(format!("optimisations.{key}: {msg}"))
            }
            other => other,
        })
    }
}

/// Named optimisation overrides, keyed by annotation name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigRegistry {
    entries: BTreeMap<String, OptimisationOverride>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy for tests and programmatic setup.
    pub fn with(mut self, key: &str, entry: OptimisationOverride) -> Self {
        self.entries.insert(key.to_string(), entry);
        self
    }

    pub fn get(&self, key: &str) -> Option<&OptimisationOverride> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve the effective configuration for an element's classes.
    ///
    /// Engine defaults ← `default` entry ← each `poi-<key>` entry in class
    /// order. Selectors naming a missing key change nothing.
    pub fn resolve(&self, annotations: &ClassAnnotations) -> OptimisationConfig {
        let mut config = OptimisationConfig::default();
        if let Some(default) = self.get(DEFAULT_KEY) {
            default.apply_to(&mut config);
        }
        for key in annotations.selectors() {
            match self.get(key) {
                Some(entry) => entry.apply_to(&mut config),
                None => log::debug!("no optimisation entry named \"{key}\"; ignoring"),
            }
        }
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, entry) in &self.entries {
            entry.validate(key)?;
        }
        Ok(())
    }
}

// =============================================================================
// Site configuration
// =============================================================================

/// Run configuration loaded from `optimise-images.toml`.
///
/// All fields have defaults; a config file need only specify what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute URL the site is served from. Prefixes derivative URLs and is
    /// stripped from `src` attributes to find local images.
    pub site_url: String,
    /// Wrap images that have a `title` in `<figure>` with a `<figcaption>`.
    pub create_captions: bool,
    /// Optimisation registry; `default` applies to all images.
    pub optimisations: ConfigRegistry,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            create_captions: true,
            optimisations: ConfigRegistry::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimisations.validate()?;
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of documents processed in parallel.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Parse and validate config from a TOML string.
pub fn parse_config(content: &str) -> Result<SiteConfig, ConfigError> {
    let config: SiteConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load config from the TOML file at `path`.
///
/// A missing file yields the stock defaults; an unreadable or invalid one is
/// an error.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    if !path.exists() {
        log::debug!("{} not found; using defaults", path.display());
        return Ok(SiteConfig::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# optimise-images configuration
# =============================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Absolute URL the site is served from, without a trailing slash.
# <img src> values starting with it are treated as local; it also prefixes
# the URLs of the generated derivatives. Leave empty for root-relative URLs.
site_url = ""

# Wrap images that carry a title attribute in
# <figure><figcaption>title</figcaption><picture>...</picture></figure>.
create_captions = true

# ---------------------------------------------------------------------------
# Optimisation registry
# ---------------------------------------------------------------------------
# [optimisations.default] applies to every image. Any other table is selected
# per image with a class named poi-<table name>, e.g. class="poi-thumb".
# Entries are sparse: only the keys they set replace the inherited values.
# class="poi-no-optimise" skips an image entirely.
[optimisations.default]
# Derivatives are scaled down to at most this width (never up).
max_width = 640

# Quality of the lossy JPEG fallback (0 = worst, 100 = best).
jpeg_quality = 75

# Quality of the WebP derivative (0 = worst, 100 = best).
webp_quality = 65

# "auto": lossless (PNG + lossless WebP) for .png sources, lossy otherwise.
# true / false force one or the other.
lossless = "auto"

# [optimisations.thumb]
# max_width = 200

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum documents processed in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
