//! Application configuration for the outreach engine.
//!
//! User config lives at `~/.outreach/outreach.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OutreachError, Result};
use crate::types::{EffortTier, ProviderConfig};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "outreach.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".outreach";

// ---------------------------------------------------------------------------
// Config structs (matching outreach.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// OpenRouter settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Per-tier completion settings.
    #[serde(default)]
    pub effort_tiers: EffortTiersConfig,

    /// Web search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Site fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry loop and lookup settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Rubric settings.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Stage result cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding `clients/` and `templates/`.
    #[serde(default = "default_context_dir")]
    pub context_dir: String,

    /// Template override applied to every run (client default otherwise).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            context_dir: default_context_dir(),
            template: None,
        }
    }
}

fn default_context_dir() -> String {
    "~/.outreach/context".into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL (without `/chat/completions`).
    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_openrouter_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_openrouter_base_url(),
            timeout_secs: default_openrouter_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_openrouter_timeout() -> u64 {
    60
}

/// `[effort_tiers.*]` sections: the `EffortTier -> ProviderConfig` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffortTiersConfig {
    #[serde(default = "default_standard_tier")]
    pub standard: ProviderConfig,
    #[serde(default = "default_enhanced_tier")]
    pub enhanced: ProviderConfig,
    #[serde(default = "default_maximum_tier")]
    pub maximum: ProviderConfig,
}

impl EffortTiersConfig {
    /// Resolve the completion settings for a tier.
    pub fn resolve(&self, tier: EffortTier) -> &ProviderConfig {
        match tier {
            EffortTier::Standard => &self.standard,
            EffortTier::Enhanced => &self.enhanced,
            EffortTier::Maximum => &self.maximum,
        }
    }
}

impl Default for EffortTiersConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_tier(),
            enhanced: default_enhanced_tier(),
            maximum: default_maximum_tier(),
        }
    }
}

fn default_standard_tier() -> ProviderConfig {
    ProviderConfig {
        model: "openai/gpt-4o-mini".into(),
        temperature: 0.3,
        max_tokens: 400,
        input_cost_per_mtok: 0.15,
        output_cost_per_mtok: 0.6,
    }
}
fn default_enhanced_tier() -> ProviderConfig {
    ProviderConfig {
        model: "openai/gpt-4o".into(),
        temperature: 0.2,
        max_tokens: 600,
        input_cost_per_mtok: 2.5,
        output_cost_per_mtok: 10.0,
    }
}
fn default_maximum_tier() -> ProviderConfig {
    ProviderConfig {
        model: "anthropic/claude-sonnet-4".into(),
        temperature: 0.1,
        max_tokens: 800,
        input_cost_per_mtok: 3.0,
        output_cost_per_mtok: 15.0,
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Brave-compatible web search endpoint.
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Name of the env var holding the search API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Number of hits requested per query.
    #[serde(default = "default_search_count")]
    pub count: u32,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
            count: default_search_count(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.search.brave.com/res/v1/web/search".into()
}
fn default_search_key_env() -> String {
    "BRAVE_SEARCH_API_KEY".into()
}
fn default_search_count() -> u32 {
    5
}
fn default_search_timeout() -> u64 {
    15
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Responses larger than this are rejected.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Extracted page text is truncated to this many characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_bytes: default_max_bytes(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    15
}
fn default_max_bytes() -> usize {
    2 * 1024 * 1024
}
fn default_max_chars() -> usize {
    6_000
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Tier used for the first attempt.
    #[serde(default = "default_initial_tier")]
    pub initial_tier: EffortTier,

    /// Whether stages may call search and fetch providers.
    #[serde(default = "default_true")]
    pub live_lookup: bool,

    /// Maximum number of generate/validate attempts per run.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Minimum score (0-100) for a draft to pass.
    #[serde(default = "default_quality_gate")]
    pub quality_gate: u8,

    /// Whole-run deadline in seconds; unset means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
}

impl GenerationConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            initial_tier: default_initial_tier(),
            live_lookup: true,
            retry_budget: default_retry_budget(),
            quality_gate: default_quality_gate(),
            run_timeout_secs: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_initial_tier() -> EffortTier {
    EffortTier::Standard
}
fn default_retry_budget() -> u32 {
    3
}
fn default_quality_gate() -> u8 {
    95
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Tokens that must not appear in the target language (case-insensitive,
    /// whole word).
    #[serde(default = "default_banned_tokens")]
    pub banned_tokens: Vec<String>,

    /// Points deducted per banned-token occurrence.
    #[serde(default = "default_banned_penalty")]
    pub banned_token_penalty: u8,

    /// Words that keep their capital after a placeholder.
    #[serde(default)]
    pub proper_nouns: Vec<String>,

    /// Sender-centric words; a draft dominated by them is not prospect-centric.
    #[serde(default = "default_sender_pronouns")]
    pub sender_pronouns: Vec<String>,

    /// Prospect-centric words.
    #[serde(default = "default_prospect_pronouns")]
    pub prospect_pronouns: Vec<String>,

    /// Ask the completion provider for a logical-correctness verdict.
    #[serde(default)]
    pub llm_judge: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            banned_tokens: default_banned_tokens(),
            banned_token_penalty: default_banned_penalty(),
            proper_nouns: Vec::new(),
            sender_pronouns: default_sender_pronouns(),
            prospect_pronouns: default_prospect_pronouns(),
            llm_judge: false,
        }
    }
}

fn default_banned_tokens() -> Vec<String> {
    ["synergy", "leverage", "circle back", "game-changer"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_banned_penalty() -> u8 {
    5
}
fn default_sender_pronouns() -> Vec<String> {
    ["we", "our", "us", "i", "my"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_prospect_pronouns() -> Vec<String> {
    ["you", "your", "yours"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Least-recently-accessed companies are evicted past this bound.
    #[serde(default = "default_max_companies")]
    pub max_companies: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_companies: default_max_companies(),
        }
    }
}

fn default_max_companies() -> usize {
    500
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.outreach/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| OutreachError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.outreach/outreach.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| OutreachError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| OutreachError::config(format!("failed to parse {}: {e}", path.display())))?;
    config.check()?;
    Ok(config)
}

impl AppConfig {
    /// Reject values the engine cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.generation.retry_budget == 0 {
            return Err(OutreachError::config("generation.retry_budget must be at least 1"));
        }
        if self.generation.quality_gate > 100 {
            return Err(OutreachError::config("generation.quality_gate must be 0-100"));
        }
        if self.cache.max_companies == 0 {
            return Err(OutreachError::config("cache.max_companies must be at least 1"));
        }
        Ok(())
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| OutreachError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| OutreachError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| OutreachError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the OpenRouter API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(OutreachError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("context_dir"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("[effort_tiers.standard]"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generation.retry_budget, 3);
        assert_eq!(parsed.generation.quality_gate, 95);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(parsed.effort_tiers.maximum, config.effort_tiers.maximum);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let toml_str = r#"
[generation]
retry_budget = 5
initial_tier = "enhanced"

[effort_tiers.standard]
model = "local/test-model"

[validation]
banned_tokens = ["basically"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.retry_budget, 5);
        assert_eq!(config.generation.initial_tier, EffortTier::Enhanced);
        assert!(config.generation.live_lookup);
        assert_eq!(config.effort_tiers.standard.model, "local/test-model");
        assert_eq!(config.effort_tiers.standard.max_tokens, 512);
        assert_eq!(config.validation.banned_tokens, vec!["basically"]);
        assert_eq!(config.cache.max_companies, 500);
    }

    #[test]
    fn tier_table_resolves_each_tier() {
        let tiers = EffortTiersConfig::default();
        assert_eq!(tiers.resolve(EffortTier::Standard).model, "openai/gpt-4o-mini");
        assert_ne!(
            tiers.resolve(EffortTier::Standard),
            tiers.resolve(EffortTier::Maximum)
        );
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let mut config = AppConfig::default();
        config.generation.retry_budget = 0;
        assert!(config.check().is_err());
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("/tmp/ctx"), PathBuf::from("/tmp/ctx"));
        assert_eq!(expand_home("relative/ctx"), PathBuf::from("relative/ctx"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "OUTREACH_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
