/*!
common/src/lib.rs

Shared configuration types and user settings for Forexscope.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader with default-file + override-file merge
- The user-editable Settings object and its JSON-file-backed store
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Default chat-completion endpoint (OpenAI-compatible).
pub const DEFAULT_LLM_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Defaults for a freshly-installed instance with no settings file yet.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_FEED_URL: &str = "https://forexlive.com/feed/news";
pub const DEFAULT_PROMPT: &str =
    "Analyze this forex news article and provide key insights and potential market impact in 2-3 sentences:";

/// HTTP server configuration section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to (e.g. "127.0.0.1")
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Location of the persisted user settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Path to the settings JSON file (e.g. "data/settings.json")
    pub path: Option<String>,
}

/// Feed relay / outbound fetching configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    pub fetch_timeout_seconds: Option<u64>,
}

/// Remote LLM endpoint configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub settings: Option<SettingsConfig>,
    #[serde(default)]
    pub relay: Option<RelayConfig>,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    pub fn bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }

    pub fn port(&self) -> u16 {
        self.server.as_ref().and_then(|s| s.port).unwrap_or(8000)
    }

    pub fn settings_path(&self) -> String {
        self.settings
            .as_ref()
            .and_then(|s| s.path.clone())
            .unwrap_or_else(|| "data/settings.json".to_string())
    }

    pub fn fetch_timeout_seconds(&self) -> u64 {
        self.relay
            .as_ref()
            .and_then(|r| r.fetch_timeout_seconds)
            .unwrap_or(10)
    }

    pub fn llm_api_url(&self) -> String {
        self.llm
            .as_ref()
            .and_then(|l| l.api_url.clone())
            .unwrap_or_else(|| DEFAULT_LLM_API_URL.to_string())
    }

    pub fn llm_timeout_seconds(&self) -> u64 {
        self.llm.as_ref().and_then(|l| l.timeout_seconds).unwrap_or(30)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

/// User-editable settings. Exactly these four fields are persisted as a single
/// JSON object; each pipeline run receives an immutable snapshot so a run in
/// flight never observes a concurrent edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// API key for the chat-completion endpoint. Empty means "not configured".
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_prompt")]
    pub prompt: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            feed_url: default_feed_url(),
            prompt: default_prompt(),
        }
    }
}

/// Partial settings update: only the fields present in the request are changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub feed_url: Option<String>,
    pub prompt: Option<String>,
}

impl SettingsPatch {
    /// Apply this patch to `settings`, returning true if any field changed.
    pub fn apply(&self, settings: &mut Settings) -> bool {
        let mut changed = false;
        if let Some(ref v) = self.api_key {
            if *v != settings.api_key {
                settings.api_key = v.clone();
                changed = true;
            }
        }
        if let Some(ref v) = self.model {
            if *v != settings.model {
                settings.model = v.clone();
                changed = true;
            }
        }
        if let Some(ref v) = self.feed_url {
            if *v != settings.feed_url {
                settings.feed_url = v.clone();
                changed = true;
            }
        }
        if let Some(ref v) = self.prompt {
            if *v != settings.prompt {
                settings.prompt = v.clone();
                changed = true;
            }
        }
        changed
    }
}

/// JSON-file-backed store for [`Settings`].
///
/// The file is read once at startup and rewritten on every mutation. Updates
/// are serialized through the store's own lock so concurrent writers cannot
/// interleave partial states on disk.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file yields the defaults; an
    /// unreadable or invalid file is an error so a corrupted settings file is
    /// noticed at startup rather than silently discarded.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse settings file: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read settings file: {}", path.display()))
            }
        };
        Ok(Self {
            path,
            current: RwLock::new(settings),
        })
    }

    /// Cloned immutable view of the current settings.
    pub async fn snapshot(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Merge `patch` into the current settings, persist the result, then swap
    /// it in memory. The file is rewritten even when nothing changed, matching
    /// the write-on-every-mutation contract of the store.
    pub async fn update(&self, patch: SettingsPatch) -> Result<Settings> {
        let mut guard = self.current.write().await;
        let mut next = guard.clone();
        patch.apply(&mut next);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create settings directory: {}", parent.display())
                })?;
            }
        }
        let data = serde_json::to_string_pretty(&next).context("Failed to serialize settings")?;
        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("Failed to write settings file: {}", self.path.display()))?;

        *guard = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_from_string_with_defaults() {
        let toml = r#"
            [server]
            bind = "0.0.0.0"
            port = 9000

            [relay]
            fetch_timeout_seconds = 5
        "#;

        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.bind(), "0.0.0.0");
        assert_eq!(cfg.port(), 9000);
        assert_eq!(cfg.fetch_timeout_seconds(), 5);
        // Sections not present fall back to defaults
        assert_eq!(cfg.settings_path(), "data/settings.json");
        assert_eq!(cfg.llm_api_url(), DEFAULT_LLM_API_URL);
        assert_eq!(cfg.llm_timeout_seconds(), 30);
    }

    #[tokio::test]
    async fn config_override_merge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        tokio::fs::write(
            &default_path,
            "[server]\nbind = \"127.0.0.1\"\nport = 8000\n\n[relay]\nfetch_timeout_seconds = 10\n",
        )
        .await
        .expect("write default");
        tokio::fs::write(&override_path, "[server]\nport = 8080\n")
            .await
            .expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load merged config");
        // Override wins for port, default survives for bind and relay
        assert_eq!(cfg.bind(), "127.0.0.1");
        assert_eq!(cfg.port(), 8080);
        assert_eq!(cfg.fetch_timeout_seconds(), 10);
    }

    #[tokio::test]
    async fn settings_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::load(dir.path().join("settings.json"))
            .await
            .expect("load store");
        let s = store.snapshot().await;
        assert_eq!(s, Settings::default());
        assert!(s.api_key.is_empty());
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data").join("settings.json");

        let store = SettingsStore::load(&path).await.expect("load store");
        let updated = store
            .update(SettingsPatch {
                api_key: Some("sk-test".into()),
                model: Some("gpt-4o-mini".into()),
                feed_url: Some("https://example.com/feed".into()),
                prompt: Some("Summarize:".into()),
            })
            .await
            .expect("update settings");

        // Reload from disk: all four fields must survive the round trip
        let reloaded = SettingsStore::load(&path).await.expect("reload store");
        let s = reloaded.snapshot().await;
        assert_eq!(s, updated);
        assert_eq!(s.api_key, "sk-test");
        assert_eq!(s.model, "gpt-4o-mini");
        assert_eq!(s.feed_url, "https://example.com/feed");
        assert_eq!(s.prompt, "Summarize:");
    }

    #[tokio::test]
    async fn settings_patch_is_partial() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::load(dir.path().join("settings.json"))
            .await
            .expect("load store");

        store
            .update(SettingsPatch {
                api_key: Some("sk-test".into()),
                ..Default::default()
            })
            .await
            .expect("update api key");

        let s = store.snapshot().await;
        assert_eq!(s.api_key, "sk-test");
        // Untouched fields keep their defaults
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.feed_url, DEFAULT_FEED_URL);
        assert_eq!(s.prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn patch_apply_reports_changes() {
        let mut s = Settings::default();
        let noop = SettingsPatch {
            model: Some(DEFAULT_MODEL.to_string()),
            ..Default::default()
        };
        assert!(!noop.apply(&mut s));

        let change = SettingsPatch {
            feed_url: Some("https://example.com/other".into()),
            ..Default::default()
        };
        assert!(change.apply(&mut s));
        assert_eq!(s.feed_url, "https://example.com/other");
    }
}
