//! Application configuration for pagekit.
//!
//! User config lives at `~/.pagekit/pagekit.toml`.
//! Environment variables override config file values, which override defaults.
//! Credentials are never stored in the file: only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PagekitError, Result};
use crate::image::ProviderName;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagekit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagekit";

// ---------------------------------------------------------------------------
// Config structs (matching pagekit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Stock image providers.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Generative fallback.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Asset cache.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-run enrichment limits.
    #[serde(default)]
    pub enrichment: EnrichmentDefaults,
}

/// `[providers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Priority order; earlier providers are queried first.
    #[serde(default = "default_provider_order")]
    pub order: Vec<String>,

    #[serde(default = "default_unsplash")]
    pub unsplash: ProviderConfig,

    #[serde(default = "default_pexels")]
    pub pexels: ProviderConfig,

    #[serde(default = "default_pixabay")]
    pub pixabay: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_provider_order(),
            unsplash: default_unsplash(),
            pexels: default_pexels(),
            pixabay: default_pixabay(),
        }
    }
}

impl ProvidersConfig {
    /// Settings for one provider.
    pub fn get(&self, name: ProviderName) -> Option<&ProviderConfig> {
        match name {
            ProviderName::Unsplash => Some(&self.unsplash),
            ProviderName::Pexels => Some(&self.pexels),
            ProviderName::Pixabay => Some(&self.pixabay),
            ProviderName::Generative => None,
        }
    }

    /// Parse `order` into provider names, rejecting unknown or generative entries.
    pub fn priority(&self) -> Result<Vec<ProviderName>> {
        let mut out = Vec::with_capacity(self.order.len());
        for raw in &self.order {
            let name: ProviderName = raw.parse().map_err(|_| {
                PagekitError::config(format!("unknown provider '{raw}' in providers.order"))
            })?;
            if name == ProviderName::Generative {
                return Err(PagekitError::config(
                    "'generative' is not a stock provider; configure it under [generation]",
                ));
            }
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Ok(out)
    }

    /// Env var holding the credential for `name`, falling back to the built-in name.
    pub fn api_key_env(&self, name: ProviderName) -> String {
        self.get(name)
            .and_then(|p| p.api_key_env.clone())
            .unwrap_or_else(|| default_key_env(name).to_string())
    }
}

/// `[providers.<name>]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Whether this provider participates in searches.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Endpoint override (tests, proxies).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_provider_order() -> Vec<String> {
    vec!["unsplash".into(), "pexels".into(), "pixabay".into()]
}

fn provider_defaults(name: ProviderName) -> ProviderConfig {
    ProviderConfig {
        enabled: true,
        api_key_env: Some(default_key_env(name).into()),
        base_url: None,
    }
}

fn default_unsplash() -> ProviderConfig {
    provider_defaults(ProviderName::Unsplash)
}
fn default_pexels() -> ProviderConfig {
    provider_defaults(ProviderName::Pexels)
}
fn default_pixabay() -> ProviderConfig {
    provider_defaults(ProviderName::Pixabay)
}

fn default_key_env(name: ProviderName) -> &'static str {
    match name {
        ProviderName::Unsplash => "UNSPLASH_ACCESS_KEY",
        ProviderName::Pexels => "PEXELS_API_KEY",
        ProviderName::Pixabay => "PIXABAY_API_KEY",
        ProviderName::Generative => "OPENAI_API_KEY",
    }
}

fn default_true() -> bool {
    true
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Whether the generative fallback is used at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the API key.
    #[serde(default = "default_generation_key_env")]
    pub api_key_env: String,

    /// Image model identifier.
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// API base URL.
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_generation_key_env(),
            model: default_generation_model(),
            base_url: default_generation_base_url(),
        }
    }
}

fn default_generation_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_generation_model() -> String {
    "gpt-image-1".into()
}
fn default_generation_base_url() -> String {
    "https://api.openai.com/v1".into()
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory. Defaults to `~/.pagekit/cache`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Capacity bound in bytes.
    #[serde(default = "default_capacity")]
    pub capacity_bytes: u64,

    /// Entries older than this are evicted regardless of pressure.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,

    /// Extra space freed on top of the incoming write during eviction.
    #[serde(default = "default_eviction_margin")]
    pub eviction_margin_bytes: u64,

    /// Downloads larger than this are rejected.
    #[serde(default = "default_max_download")]
    pub max_download_bytes: u64,

    /// Prefix under which cached files are served to the rendered page.
    #[serde(default = "default_public_url_prefix")]
    pub public_url_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            capacity_bytes: default_capacity(),
            max_age_secs: default_max_age(),
            eviction_margin_bytes: default_eviction_margin(),
            max_download_bytes: default_max_download(),
            public_url_prefix: default_public_url_prefix(),
        }
    }
}

fn default_capacity() -> u64 {
    512 * 1024 * 1024
}
fn default_max_age() -> u64 {
    30 * 24 * 60 * 60
}
fn default_eviction_margin() -> u64 {
    1024 * 1024
}
fn default_max_download() -> u64 {
    20 * 1024 * 1024
}
fn default_public_url_prefix() -> String {
    "/assets/cache".into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentDefaults {
    /// Cap on provider, download and generation calls per run.
    #[serde(default = "default_max_calls")]
    pub max_external_calls: u32,

    /// Maximum in-flight enrichment tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Run deadline in seconds. `0` disables the deadline.
    #[serde(default = "default_deadline")]
    pub deadline_secs: u64,

    /// Download stock results into the cache instead of hot-linking them.
    #[serde(default = "default_true")]
    pub download_assets: bool,
}

impl Default for EnrichmentDefaults {
    fn default() -> Self {
        Self {
            max_external_calls: default_max_calls(),
            concurrency: default_concurrency(),
            deadline_secs: default_deadline(),
            download_assets: true,
        }
    }
}

fn default_max_calls() -> u32 {
    60
}
fn default_concurrency() -> u32 {
    4
}
fn default_deadline() -> u64 {
    90
}

// ---------------------------------------------------------------------------
// Runtime settings (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime cache settings, resolved from `[cache]`.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub capacity_bytes: u64,
    pub max_age: Duration,
    pub eviction_margin_bytes: u64,
}

impl CacheSettings {
    /// Settings rooted at `dir` with the default bounds.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        let defaults = CacheConfig::default();
        Self {
            dir: dir.into(),
            capacity_bytes: defaults.capacity_bytes,
            max_age: Duration::from_secs(defaults.max_age_secs),
            eviction_margin_bytes: defaults.eviction_margin_bytes,
        }
    }
}

impl TryFrom<&AppConfig> for CacheSettings {
    type Error = PagekitError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let dir = match &config.cache.dir {
            Some(dir) => expand_home(dir)?,
            None => config_dir()?.join("cache"),
        };
        Ok(Self {
            dir,
            capacity_bytes: config.cache.capacity_bytes,
            max_age: Duration::from_secs(config.cache.max_age_secs),
            eviction_margin_bytes: config.cache.eviction_margin_bytes,
        })
    }
}

/// Runtime per-run limits, resolved from `[enrichment]` and `[generation]`.
#[derive(Debug, Clone)]
pub struct RunLimits {
    pub max_external_calls: usize,
    pub concurrency: usize,
    pub deadline: Option<Duration>,
    pub generation_enabled: bool,
    pub download_assets: bool,
}

impl From<&AppConfig> for RunLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_external_calls: config.enrichment.max_external_calls as usize,
            concurrency: config.enrichment.concurrency.max(1) as usize,
            deadline: match config.enrichment.deadline_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            generation_enabled: config.generation.enabled,
            download_assets: config.enrichment.download_assets,
        }
    }
}

impl Default for RunLimits {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagekit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagekitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagekit/pagekit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk, then apply environment overrides.
/// Falls back to defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PagekitError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| PagekitError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Apply `PAGEKIT_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
        raw.trim()
            .parse()
            .map_err(|_| PagekitError::config(format!("{key}={raw:?} is not a valid number")))
    }

    if let Some(dir) = lookup("PAGEKIT_CACHE_DIR").filter(|v| !v.is_empty()) {
        config.cache.dir = Some(dir);
    }
    if let Some(raw) = lookup("PAGEKIT_CACHE_CAPACITY_BYTES") {
        config.cache.capacity_bytes = parse("PAGEKIT_CACHE_CAPACITY_BYTES", &raw)?;
    }
    if let Some(raw) = lookup("PAGEKIT_CACHE_MAX_AGE_SECS") {
        config.cache.max_age_secs = parse("PAGEKIT_CACHE_MAX_AGE_SECS", &raw)?;
    }
    if let Some(raw) = lookup("PAGEKIT_MAX_EXTERNAL_CALLS") {
        config.enrichment.max_external_calls = parse("PAGEKIT_MAX_EXTERNAL_CALLS", &raw)?;
    }
    if let Some(raw) = lookup("PAGEKIT_CONCURRENCY") {
        config.enrichment.concurrency = parse("PAGEKIT_CONCURRENCY", &raw)?;
    }
    if let Some(raw) = lookup("PAGEKIT_DEADLINE_SECS") {
        config.enrichment.deadline_secs = parse("PAGEKIT_DEADLINE_SECS", &raw)?;
    }
    Ok(())
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PagekitError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PagekitError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PagekitError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a credential from the environment.
pub fn resolve_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(PagekitError::config(format!(
            "credential not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every enabled provider (and the generator, if enabled) has a credential.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    for name in config.providers.priority()? {
        let enabled = config.providers.get(name).is_some_and(|p| p.enabled);
        if enabled {
            resolve_api_key(&config.providers.api_key_env(name))
                .map_err(|e| PagekitError::config(format!("{name}: {e}")))?;
        }
    }
    if config.generation.enabled {
        resolve_api_key(&config.generation.api_key_env)
            .map_err(|e| PagekitError::config(format!("generation: {e}")))?;
    }
    Ok(())
}

/// Expand a leading `~/` to the home directory.
fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PagekitError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}
