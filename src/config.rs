use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevlensConfig {
    /// Address of the Ollama server.
    pub model_addr: String,
    /// Model id used by `ask`.
    pub model_id: String,
    /// Name used as the fixed commit author identity.
    pub author: String,
}

impl Default for RevlensConfig {
    fn default() -> Self {
        Self {
            model_addr: "http://127.0.0.1:11434".to_string(),
            model_id: "mistral".to_string(),
            author: "revlens".to_string(),
        }
    }
}

fn config_path() -> PathBuf {
    let mut path = dirs_home().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("revlens");
    path.push("config.toml");
    path
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Load config from `~/.config/revlens/config.toml`, falling back to
/// defaults when the file is missing or malformed.
pub fn load_config() -> RevlensConfig {
    let contents = match std::fs::read_to_string(config_path()) {
        Ok(c) => c,
        Err(_) => return RevlensConfig::default(),
    };
    toml::from_str(&contents).unwrap_or_default()
}
