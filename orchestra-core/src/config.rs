//! Configuration system for OrchestraAI.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment.
//! Configuration is loaded from the user config directory (`config.toml`) and/or
//! `.orchestra/config.toml` in the workspace directory.
//!
//! [`Settings`] are the user-editable research preferences. The loaded file only
//! seeds them; afterwards they live in the session store and change solely
//! through the SaveSettings action.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 1.0;
pub const MIN_MAX_TOKENS: u32 = 512;
pub const MAX_MAX_TOKENS: u32 = 200_000;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Credential key for the web search provider.
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";
pub const GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";
pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

/// LLM provider backing every stage of the research pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[serde(alias = "Google", alias = "gemini")]
    Google,
    #[serde(alias = "Anthropic", alias = "claude")]
    Anthropic,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Google, Provider::Anthropic];

    /// The single model every pipeline stage uses for this provider.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::Google => "gemini-2.0-flash",
            Provider::Anthropic => "anthropic:claude-3-5-sonnet",
        }
    }

    /// Name of the credential this provider needs.
    pub fn credential_key(self) -> &'static str {
        match self {
            Provider::Google => GOOGLE_API_KEY,
            Provider::Anthropic => ANTHROPIC_API_KEY,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Google => write!(f, "Google"),
            Provider::Anthropic => write!(f, "Anthropic"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(ConfigError::Invalid {
                message: format!("unknown provider '{other}' (expected google or anthropic)"),
            }),
        }
    }
}

/// User-chosen research preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: Provider,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Secrets keyed by credential name (e.g. `TAVILY_API_KEY`).
    #[serde(alias = "apiKeys", alias = "api_keys")]
    pub credentials: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            credentials: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Validate these settings and return any warnings.
    ///
    /// Returns an empty Vec when nothing looks wrong. Warnings never block a run.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&self.temperature) {
            warnings.push(format!(
                "temperature ({}) is outside the supported range {MIN_TEMPERATURE}-{MAX_TEMPERATURE}",
                self.temperature
            ));
        }
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&self.max_tokens) {
            warnings.push(format!(
                "max_tokens ({}) is outside the supported range {MIN_MAX_TOKENS}-{MAX_MAX_TOKENS}",
                self.max_tokens
            ));
        }
        let key = self.provider.credential_key();
        if !self.has_credential(key) {
            warnings.push(format!("{key} is not set for provider {}", self.provider));
        }
        if !self.has_credential(TAVILY_API_KEY) {
            warnings.push(format!("{TAVILY_API_KEY} is not set; web search will fail"));
        }
        warnings
    }

    /// Return a copy with temperature and token budget forced into range.
    pub fn clamped(mut self) -> Self {
        self.temperature = if self.temperature.is_nan() {
            DEFAULT_TEMPERATURE
        } else {
            self.temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
        };
        self.max_tokens = self.max_tokens.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
        self
    }

    pub fn has_credential(&self, key: &str) -> bool {
        self.credentials
            .get(key)
            .is_some_and(|v| !v.trim().is_empty())
    }

    /// Apply a settings form submission.
    ///
    /// Numeric fields are clamped. A credential submitted blank keeps the
    /// previously stored secret; credentials absent from the update are kept.
    pub fn apply_update(&self, update: SettingsUpdate) -> Settings {
        let mut credentials = self.credentials.clone();
        for (key, value) in update.credentials {
            let value = value.trim();
            if !value.is_empty() {
                credentials.insert(key.to_ascii_uppercase(), value.to_string());
            }
        }
        Settings {
            provider: update.provider,
            temperature: update.temperature,
            max_tokens: update.max_tokens,
            credentials,
        }
        .clamped()
    }

    /// Render settings for display with secret values hidden.
    ///
    /// A present secret shows as `***`, an empty one as an empty string.
    pub fn masked(&self) -> serde_json::Value {
        let credentials: serde_json::Map<String, serde_json::Value> = self
            .credentials
            .iter()
            .map(|(k, v)| {
                let shown = if v.trim().is_empty() { "" } else { "***" };
                (k.clone(), serde_json::Value::from(shown))
            })
            .collect();
        serde_json::json!({
            "provider": self.provider,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "credentials": credentials,
        })
    }

    fn normalize_credential_keys(&mut self) {
        self.credentials = std::mem::take(&mut self.credentials)
            .into_iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v))
            .collect();
    }
}

/// The values a SaveSettings action carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsUpdate {
    pub provider: Provider,
    pub temperature: f32,
    pub max_tokens: u32,
    pub credentials: BTreeMap<String, String>,
}

impl From<&Settings> for SettingsUpdate {
    fn from(settings: &Settings) -> Self {
        Self {
            provider: settings.provider,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            credentials: BTreeMap::new(),
        }
    }
}

/// Where the external research agent is deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentEndpointConfig {
    /// Base URL of the LangGraph-style deployment.
    pub base_url: String,
    /// Graph (assistant) identifier to run.
    pub assistant_id: String,
    /// Optional request timeout in seconds. No timeout when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for AgentEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:2024".to_string(),
            assistant_id: "deep_researcher".to_string(),
            timeout_secs: None,
        }
    }
}

/// Research history storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// History file; relative paths resolve against the workspace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl HistoryConfig {
    /// Resolve the history file location.
    ///
    /// Explicit path first, then the per-user data directory, then
    /// `.orchestra/history.json` inside the workspace.
    pub fn resolve_path(&self, workspace: &Path) -> PathBuf {
        if let Some(path) = &self.path {
            return if path.is_absolute() {
                path.clone()
            } else {
                workspace.join(path)
            };
        }
        project_dirs()
            .map(|d| d.data_dir().join("history.json"))
            .unwrap_or_else(|| workspace.join(".orchestra").join("history.json"))
    }
}

/// Top-level configuration for the OrchestraAI front-end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial research settings for new interactive sessions.
    pub settings: Settings,
    pub agent: AgentEndpointConfig,
    pub history: HistoryConfig,
}

impl AppConfig {
    /// Validate the loaded configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.settings.validate();
        if self.agent.base_url.trim().is_empty() {
            warnings.push("agent.base_url is empty".to_string());
        }
        if self.agent.timeout_secs == Some(0) {
            warnings.push("agent.timeout_secs is 0; requests will fail immediately".to_string());
        }
        warnings
    }
}

pub(crate) fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("ai", "orchestra", "orchestra")
}

/// Per-user data directory (logs, history). Falls back to `.orchestra`.
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".orchestra"))
}

/// Load configuration with layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `ORCHESTRA_`)
/// 2. Explicit config file (`--config`), else workspace-local `.orchestra/config.toml`
/// 3. User config (`<config_dir>/config.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    } else if let Some(ws) = workspace {
        let ws_config = ws.join(".orchestra").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // ORCHESTRA_SETTINGS__PROVIDER, ORCHESTRA_AGENT__BASE_URL, ...
    figment = figment.merge(Env::prefixed("ORCHESTRA_").split("__"));

    let mut config: AppConfig = figment.extract().map_err(Box::new)?;
    // Environment keys arrive lowercased.
    config.settings.normalize_credential_keys();
    Ok(config)
}

/// Check whether any configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(dirs) = project_dirs()
        && dirs.config_dir().join("config.toml").exists()
    {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(".orchestra").join("config.toml").exists())
}

/// Write a default `.orchestra/config.toml` into the workspace.
///
/// Returns the path and whether a new file was created; an existing file is
/// left untouched.
pub fn init_workspace_config(workspace: &Path) -> Result<(PathBuf, bool), ConfigError> {
    let path = workspace.join(".orchestra").join("config.toml");
    if path.exists() {
        return Ok((path, false));
    }
    let toml_str =
        toml::to_string_pretty(&AppConfig::default()).map_err(|e| ConfigError::Serialize {
            message: e.to_string(),
        })?;
    crate::persistence::atomic_write(&path, toml_str.as_bytes()).map_err(|e| {
        ConfigError::Invalid {
            message: format!("cannot write {}: {e}", path.display()),
        }
    })?;
    Ok((path, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.provider, Provider::Google);
        assert_eq!(settings.temperature, 0.2);
        assert_eq!(settings.max_tokens, 2048);
        assert!(settings.credentials.is_empty());
    }

    #[test]
    fn test_provider_models() {
        assert_eq!(Provider::Google.default_model(), "gemini-2.0-flash");
        assert_eq!(
            Provider::Anthropic.default_model(),
            "anthropic:claude-3-5-sonnet"
        );
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("Google".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("openai".parse::<Provider>().is_err());
    }

    #[test]
    fn test_settings_deserialize_partial_uses_defaults() {
        let settings: Settings = toml::from_str(r#"provider = "anthropic""#).unwrap();
        assert_eq!(settings.provider, Provider::Anthropic);
        assert_eq!(settings.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(settings.temperature, DEFAULT_TEMPERATURE);
    }

    #[test]
    fn test_settings_accepts_api_keys_alias() {
        let settings: Settings = serde_json::from_str(
            r#"{"provider": "Google", "apiKeys": {"TAVILY_API_KEY": "tv"}}"#,
        )
        .unwrap();
        assert!(settings.has_credential(TAVILY_API_KEY));
    }

    #[test]
    fn test_clamped() {
        let settings = Settings {
            temperature: 1.7,
            max_tokens: 10,
            ..Settings::default()
        }
        .clamped();
        assert_eq!(settings.temperature, 1.0);
        assert_eq!(settings.max_tokens, 512);

        let settings = Settings {
            temperature: f32::NAN,
            max_tokens: 900_000,
            ..Settings::default()
        }
        .clamped();
        assert_eq!(settings.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(settings.max_tokens, 200_000);
    }

    #[test]
    fn test_validate_warnings() {
        let settings = Settings {
            temperature: 3.0,
            ..Settings::default()
        };
        let warnings = settings.validate();
        assert!(warnings.iter().any(|w| w.contains("temperature")));
        assert!(warnings.iter().any(|w| w.contains(GOOGLE_API_KEY)));
        assert!(warnings.iter().any(|w| w.contains(TAVILY_API_KEY)));

        let mut ok = Settings::default();
        ok.credentials.insert(GOOGLE_API_KEY.into(), "g".into());
        ok.credentials.insert(TAVILY_API_KEY.into(), "t".into());
        assert!(ok.validate().is_empty());
    }

    #[test]
    fn test_apply_update_keeps_blank_credentials() {
        let mut current = Settings::default();
        current
            .credentials
            .insert(TAVILY_API_KEY.into(), "old-tavily".into());
        current
            .credentials
            .insert(GOOGLE_API_KEY.into(), "old-google".into());

        let update = SettingsUpdate {
            provider: Provider::Anthropic,
            temperature: 0.5,
            max_tokens: 4096,
            credentials: BTreeMap::from([
                (TAVILY_API_KEY.to_string(), "   ".to_string()),
                (ANTHROPIC_API_KEY.to_string(), " new-anthropic ".to_string()),
            ]),
        };
        let saved = current.apply_update(update);

        assert_eq!(saved.provider, Provider::Anthropic);
        assert_eq!(saved.temperature, 0.5);
        assert_eq!(saved.max_tokens, 4096);
        assert_eq!(saved.credentials[TAVILY_API_KEY], "old-tavily");
        assert_eq!(saved.credentials[GOOGLE_API_KEY], "old-google");
        assert_eq!(saved.credentials[ANTHROPIC_API_KEY], "new-anthropic");
    }

    #[test]
    fn test_masked_hides_secrets() {
        let mut settings = Settings::default();
        settings
            .credentials
            .insert(TAVILY_API_KEY.into(), "secret".into());
        settings.credentials.insert(GOOGLE_API_KEY.into(), "".into());

        let masked = settings.masked();
        assert_eq!(masked["credentials"][TAVILY_API_KEY], "***");
        assert_eq!(masked["credentials"][GOOGLE_API_KEY], "");
        assert!(!masked.to_string().contains("secret"));
    }

    #[test]
    fn test_history_path_resolution() {
        let ws = Path::new("/work");
        let explicit = HistoryConfig {
            path: Some(PathBuf::from("logs/history.json")),
        };
        assert_eq!(
            explicit.resolve_path(ws),
            PathBuf::from("/work/logs/history.json")
        );

        let absolute = HistoryConfig {
            path: Some(PathBuf::from("/var/orchestra/history.json")),
        };
        assert_eq!(
            absolute.resolve_path(ws),
            PathBuf::from("/var/orchestra/history.json")
        );
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.settings, config.settings);
        assert_eq!(deserialized.agent.base_url, config.agent.base_url);
    }

    #[test]
    fn test_load_config_from_workspace_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".orchestra");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            r#"
[settings]
provider = "anthropic"
max_tokens = 8192

[settings.credentials]
tavily_api_key = "tv"

[agent]
assistant_id = "open_deep_research"
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.settings.provider, Provider::Anthropic);
        assert_eq!(config.settings.max_tokens, 8192);
        assert!(config.settings.has_credential(TAVILY_API_KEY));
        assert_eq!(config.agent.assistant_id, "open_deep_research");
    }

    #[test]
    fn test_load_config_explicit_file_replaces_workspace_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let ws_dir = dir.path().join(".orchestra");
        std::fs::create_dir_all(&ws_dir).unwrap();
        std::fs::write(ws_dir.join("config.toml"), "[agent]\nassistant_id = \"workspace\"\n").unwrap();
        let explicit = dir.path().join("custom.toml");
        std::fs::write(&explicit, "[agent]\nbase_url = \"http://agent.internal:8123\"\n").unwrap();

        let config = load_config(Some(dir.path()), Some(&explicit)).unwrap();
        assert_eq!(config.agent.base_url, "http://agent.internal:8123");
        assert_eq!(config.agent.assistant_id, "deep_researcher");
    }

    #[test]
    fn test_init_workspace_config_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let (path, created) = init_workspace_config(dir.path()).unwrap();
        assert!(created);
        assert!(path.exists());

        let (_, created_again) = init_workspace_config(dir.path()).unwrap();
        assert!(!created_again);
    }
}
