use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// How historical page observations are matched against the page the agent
/// is currently on when building the transport payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedactBy {
    /// Full content is kept for every message tagged with the current URL.
    #[default]
    Url,
    /// Full content is kept only for messages captured since the last navigation.
    Generation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    /// Explicit provider name; inferred from the model prefix or available keys when absent.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
    /// Upper bound, in characters, for every message appended to the conversation.
    #[serde(default = "default_context_length_limit")]
    pub context_length_limit: usize,
    /// Budget, in characters, for distilled page content.
    #[serde(default = "default_content_char_limit")]
    pub content_char_limit: usize,
    /// Model turns allowed per task before control returns to the operator.
    #[serde(default = "default_max_model_turns")]
    pub max_model_turns: u32,
    #[serde(default)]
    pub redact_by: RedactBy,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    2000
}

fn default_context_length_limit() -> usize {
    6000
}

fn default_content_char_limit() -> usize {
    6000
}

fn default_max_model_turns() -> u32 {
    100
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            provider: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
            context_length_limit: default_context_length_limit(),
            content_char_limit: default_content_char_limit(),
            max_model_turns: default_max_model_turns(),
            redact_by: RedactBy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

/// Order in which focusable elements are visited while indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FocusStrategy {
    /// Real Tab key presses, reading `document.activeElement` after each one.
    #[default]
    Keyboard,
    /// Sequential navigation order computed by page script.
    Script,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Chrome/Chromium binary; searched on PATH when absent.
    #[serde(default)]
    pub executable_path: Option<String>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra wait after a settled navigation so late scripts can render.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Responses with a larger content-length are treated as downloads.
    #[serde(default = "default_download_size_threshold")]
    pub download_size_threshold: u64,
    #[serde(default)]
    pub focus_strategy: FocusStrategy,
    #[serde(default = "default_max_focus_steps")]
    pub max_focus_steps: usize,
    #[serde(default = "default_text_limit")]
    pub text_limit: usize,
    #[serde(default = "default_attr_limit")]
    pub attr_limit: usize,
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_launch_timeout_secs() -> u64 {
    15
}

fn default_navigation_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_download_size_threshold() -> u64 {
    10 * 1024 * 1024
}

fn default_max_focus_steps() -> usize {
    300
}

fn default_text_limit() -> usize {
    60
}

fn default_attr_limit() -> usize {
    60
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            executable_path: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            launch_timeout_secs: default_launch_timeout_secs(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            download_size_threshold: default_download_size_threshold(),
            focus_strategy: FocusStrategy::default(),
            max_focus_steps: default_max_focus_steps(),
            text_limit: default_text_limit(),
            attr_limit: default_attr_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    #[serde(default = "default_read_file_max_bytes")]
    pub read_file_max_bytes: usize,
}

fn default_read_file_max_bytes() -> usize {
    20_000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            read_file_max_bytes: default_read_file_max_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Proxy URL for completion API traffic. Empty string forces a direct connection.
    #[serde(default)]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("openai".to_string(), ProviderConfig::default());
        providers.insert("openrouter".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("https://openrouter.ai/api/v1".to_string()),
        });
        providers.insert("deepseek".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("https://api.deepseek.com/v1".to_string()),
        });
        providers.insert("groq".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("https://api.groq.com/openai/v1".to_string()),
        });
        providers.insert("vllm".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("http://localhost:8000/v1".to_string()),
        });
        providers.insert("ollama".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("http://localhost:11434/v1".to_string()),
        });

        Self {
            providers,
            agents: AgentsConfig::default(),
            browser: BrowserConfig::default(),
            tools: ToolsConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// First provider with a non-empty key, in priority order.
    pub fn get_api_key(&self) -> Option<(&str, &ProviderConfig)> {
        let priority = ["openai", "openrouter", "deepseek", "groq", "ollama", "vllm"];

        for name in priority {
            if let Some(provider) = self.providers.get(name) {
                if !provider.api_key.is_empty() {
                    return Some((name, provider));
                }
            }
        }
        None
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    /// Fill the OpenAI key from `OPENAI_API_KEY` when the config leaves it empty.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if key.trim().is_empty() {
                return;
            }
            let entry = self.providers.entry("openai".to_string()).or_default();
            if entry.api_key.is_empty() {
                entry.api_key = key.trim().to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg: Config = serde_json::from_str(r#"{"providers": {}}"#).unwrap();
        assert_eq!(cfg.agents.defaults.context_length_limit, 6000);
        assert_eq!(cfg.browser.poll_interval_ms, 500);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.agents.defaults.redact_by, RedactBy::Url);
        assert_eq!(cfg.browser.focus_strategy, FocusStrategy::Keyboard);
    }

    #[test]
    fn test_camel_case_overrides() {
        let raw = r#"{
  "agents": { "defaults": { "model": "gpt-4", "contextLengthLimit": 3000, "redactBy": "generation" } },
  "browser": { "headless": false, "navigationTimeoutMs": 2500, "focusStrategy": "script" }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.agents.defaults.model, "gpt-4");
        assert_eq!(cfg.agents.defaults.context_length_limit, 3000);
        assert_eq!(cfg.agents.defaults.redact_by, RedactBy::Generation);
        assert!(!cfg.browser.headless);
        assert_eq!(cfg.browser.navigation_timeout_ms, 2500);
        assert_eq!(cfg.browser.focus_strategy, FocusStrategy::Script);
        // untouched fields keep their defaults
        assert_eq!(cfg.browser.max_focus_steps, 300);
    }

    #[test]
    fn test_get_api_key_prefers_openai() {
        let mut cfg = Config::default();
        cfg.providers.get_mut("deepseek").unwrap().api_key = "ds".into();
        assert_eq!(cfg.get_api_key().map(|(n, _)| n), Some("deepseek"));
        cfg.providers.get_mut("openai").unwrap().api_key = "sk".into();
        assert_eq!(cfg.get_api_key().map(|(n, _)| n), Some("openai"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join("webrover_config_test");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.json");
        let mut cfg = Config::default();
        cfg.agents.defaults.max_model_turns = 7;
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.agents.defaults.max_model_turns, 7);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
