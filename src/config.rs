use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cardmark")]
#[command(about = "Runs the cardmark highlight relay", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cardmark")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    database: String,
    port: i32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_event_buffer() -> usize {
    256
}

impl Default for App {
    fn default() -> Self {
        App {
            database: "cardmark.db".to_string(),
            port: 7878,
            request_timeout_ms: default_request_timeout(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl App {
    pub fn get_db(&self) -> &str {
        return &self.database;
    }

    pub fn get_port(&self) -> i32 {
        return self.port;
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ai {
    #[serde(default = "default_ai_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_ai_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_ai_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for Ai {
    fn default() -> Self {
        Ai {
            endpoint: default_ai_endpoint(),
            model: default_ai_model(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Mochi {
    #[serde(default = "default_mochi_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    pub deck_id: String,
}

fn default_mochi_endpoint() -> String {
    "https://app.mochi.cards/api/cards".to_string()
}

impl Default for Mochi {
    fn default() -> Self {
        Mochi {
            endpoint: default_mochi_endpoint(),
            api_key: None,
            deck_id: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Obsidian {
    pub vault: String,
    #[serde(default = "default_note_file")]
    pub file_name: String,
}

fn default_note_file() -> String {
    "cardmark_flashcards".to_string()
}

impl Default for Obsidian {
    fn default() -> Self {
        Obsidian {
            vault: String::new(),
            file_name: default_note_file(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub ai: Ai,
    #[serde(default)]
    pub mochi: Mochi,
    #[serde(default)]
    pub obsidian: Obsidian,
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        Ok(cfg)
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::from_yaml(&yaml_str)
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                // ${VAR:-default}
                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(variable = var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
