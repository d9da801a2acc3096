use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"{
    "model": "llama2",
    "prompt": "{{text}}",
    "temperature": 0.7,
    "max_tokens": 2000
}"#;

pub const DEFAULT_HOTKEY: &str = "Ctrl+Shift+Space";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default)]
    pub hotkey: HotkeyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub combo: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            prompt_template: default_prompt_template(),
            hotkey: HotkeyConfig::default(),
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            combo: DEFAULT_HOTKEY.to_string(),
        }
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn config_path() -> PathBuf {
    let mut root = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    root.push(".config");
    root.push("ghostwrite");
    root.push("config.toml");
    root
}

pub fn load_or_init() -> Result<Config, ConfigError> {
    let path = config_path();
    if path.exists() {
        let raw = fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&raw)?;
        return Ok(cfg);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let defaults = include_str!("../config/default.toml");
    fs::write(&path, defaults)?;
    let cfg: Config = toml::from_str(defaults)?;
    Ok(cfg)
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(cfg).expect("config serialization should not fail");
    fs::write(path, raw)?;
    Ok(())
}
