//! Service configuration (`~/.successdesk/config.json`).
//!
//! Every field has a serde default so a missing or partial file still loads.
//! Secrets may come from the environment instead of the file; environment
//! values win.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub intelligence: IntelligenceConfig,
    #[serde(default)]
    pub recall: RecallConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// Overrides the database location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// How far back the Gmail import looks.
    #[serde(default = "default_gmail_lookback_days")]
    pub gmail_lookback_days: u32,
    /// Upper bound on threads fetched per sync.
    #[serde(default = "default_max_threads")]
    pub max_threads_per_sync: usize,
    #[serde(default = "default_calendar_past_days")]
    pub calendar_past_days: i64,
    #[serde(default = "default_calendar_future_days")]
    pub calendar_future_days: i64,
    #[serde(default = "default_calendar_ids")]
    pub calendar_ids: Vec<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            gmail_lookback_days: default_gmail_lookback_days(),
            max_threads_per_sync: default_max_threads(),
            calendar_past_days: default_calendar_past_days(),
            calendar_future_days: default_calendar_future_days(),
            calendar_ids: default_calendar_ids(),
        }
    }
}

fn default_gmail_lookback_days() -> u32 {
    30
}

fn default_max_threads() -> usize {
    200
}

fn default_calendar_past_days() -> i64 {
    30
}

fn default_calendar_future_days() -> i64 {
    30
}

fn default_calendar_ids() -> Vec<String> {
    vec!["primary".to_string()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntelligenceConfig {
    #[serde(default)]
    pub provider: LlmProviderKind,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Capacity of the analysis queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::default(),
            gemini_model: default_gemini_model(),
            openai_model: default_openai_model(),
            gemini_api_key: None,
            openai_api_key: None,
            temperature: default_temperature(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_queue_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallConfig {
    #[serde(default = "default_recall_base")]
    pub api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Shared secret expected as `?token=` on webhook calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<String>,
    /// Public URL of `/api/webhooks/recall`, handed to new bots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_webhook_url: Option<String>,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_recall_base(),
            api_key: None,
            bot_name: default_bot_name(),
            webhook_token: None,
            public_webhook_url: None,
        }
    }
}

fn default_recall_base() -> String {
    "https://us-west-2.recall.ai/api/v1".to_string()
}

fn default_bot_name() -> String {
    "SuccessDesk Notetaker".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub auto_sync_enabled: bool,
    #[serde(default = "default_auto_sync_interval")]
    pub auto_sync_interval_minutes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_enabled: false,
            auto_sync_interval_minutes: default_auto_sync_interval(),
        }
    }
}

fn default_auto_sync_interval() -> u64 {
    60
}

impl Config {
    /// Overlay secrets and paths from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get("SUCCESSDESK_DB_PATH") {
            self.db_path = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLIENT_ID") {
            self.google.client_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.intelligence.gemini_api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.intelligence.openai_api_key = Some(v);
        }
        if let Some(v) = get("RECALL_API_KEY") {
            self.recall.api_key = Some(v);
        }
        if let Some(v) = get("RECALL_WEBHOOK_TOKEN") {
            self.recall.webhook_token = Some(v);
        }
    }
}

/// Get the canonical config file path (~/.successdesk/config.json)
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".successdesk").join("config.json"))
}

/// Load the config from the default path, then apply environment overrides.
/// A missing file yields the defaults.
pub fn load_config() -> Result<Config, String> {
    let mut config = load_config_from(&config_path()?)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Load a config file without environment overrides.
pub fn load_config_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        log::info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Write the config as pretty JSON, creating the parent directory.
pub fn save_config(config: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.google.calendar_ids, vec!["primary"]);
        assert_eq!(config.intelligence.provider, LlmProviderKind::Gemini);
        assert!(!config.sync.auto_sync_enabled);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"google": {"gmailLookbackDays": 7}, "intelligence": {"provider": "openai"}}"#,
        )
        .unwrap();
        let config = load_config_from(&path).unwrap();
        assert_eq!(config.google.gmail_lookback_days, 7);
        assert_eq!(config.google.max_threads_per_sync, 200);
        assert_eq!(config.intelligence.provider, LlmProviderKind::OpenAi);
        assert_eq!(config.intelligence.openai_model, "gpt-4o-mini");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.sync.auto_sync_enabled = true;
        save_config(&config, &path).unwrap();
        assert!(load_config_from(&path).unwrap().sync.auto_sync_enabled);
    }

    #[test]
    fn test_env_overrides_win_and_ignore_blank() {
        let mut config = Config::default();
        config.recall.api_key = Some("from-file".into());
        config.apply_overrides_from(|key| match key {
            "RECALL_API_KEY" => Some("from-env".into()),
            "GEMINI_API_KEY" => Some("   ".into()),
            _ => None,
        });
        assert_eq!(config.recall.api_key.as_deref(), Some("from-env"));
        assert!(config.intelligence.gemini_api_key.is_none());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(load_config_from(&path).unwrap_err().contains("parse"));
    }
}
