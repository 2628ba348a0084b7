//! Configuration management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::HumanInputMode;
use crate::chat::{DEFAULT_MAX_TURNS, DEFAULT_TERMINATION_KEYWORD};
use crate::error::Error;
use crate::Result;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// LLM provider to use
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Gemini API key (falls back to `GEMINI_API_KEY` when empty)
    #[serde(default)]
    pub gemini_api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the assistant agent
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// System message of the assistant agent
    #[serde(default = "default_system_message")]
    pub system_message: String,

    /// Name of the user proxy agent
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Turn limit for a chat
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Reply text that ends a chat
    #[serde(default = "default_termination_keyword")]
    pub termination_keyword: String,

    /// When the user proxy asks for input
    #[serde(default)]
    pub human_input_mode: HumanInputMode,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_agent_name() -> String {
    "assistant".to_string()
}

fn default_system_message() -> String {
    "You control the light".to_string()
}

fn default_user_name() -> String {
    "user".to_string()
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_termination_keyword() -> String {
    DEFAULT_TERMINATION_KEYWORD.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            gemini_api_key: String::new(),
            model: default_model(),
            agent_name: default_agent_name(),
            system_message: default_system_message(),
            user_name: default_user_name(),
            max_turns: default_max_turns(),
            termination_keyword: default_termination_keyword(),
            human_input_mode: HumanInputMode::default(),
        }
    }
}

impl Config {
    /// API key from the config file, else from the environment
    pub fn api_key(&self) -> Option<String> {
        if !self.gemini_api_key.is_empty() {
            return Some(self.gemini_api_key.clone());
        }
        std::env::var(API_KEY_ENV).ok().filter(|key| !key.is_empty())
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default location
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from a file
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'parley init' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration, using defaults when no file exists
pub fn load_or_default() -> Result<Config> {
    let path = config_path();
    if path.exists() {
        load_from(&path)
    } else {
        Ok(Config::default())
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

/// Save configuration to a file
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Interactively create the configuration file
pub fn init() -> Result<()> {
    use inquire::{Confirm, Text};

    use crate::ui;

    let path = config_path();
    if path.exists() {
        let overwrite = Confirm::new("A configuration already exists. Overwrite it?")
            .with_default(false)
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
        if !overwrite {
            ui::print_step("Keeping existing configuration.");
            return Ok(());
        }
    }

    let mut config = Config::default();

    let key = Text::new("Enter your Gemini API Key:")
        .with_help_message("Leave empty to read GEMINI_API_KEY from the environment")
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    config.gemini_api_key = key.trim().to_string();

    config.model = Text::new("Model:")
        .with_default(&config.model)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    save_to(&config, &path)?;
    ui::print_success(&format!("Configuration saved to {:?}", path));
    Ok(())
}
