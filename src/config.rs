use crate::core::model::Language;
use crate::error::OrionError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_OPTIMIZER_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_FAST_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub optimizer_model: String,
    pub simulation_model: String,
    pub judge_model: String,
    pub temperature: f32,
    pub thinking_budget: u32,
    pub timeout: Duration,
    pub data_dir: PathBuf,
    pub language: Language,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            optimizer_model: DEFAULT_OPTIMIZER_MODEL.to_string(),
            simulation_model: DEFAULT_FAST_MODEL.to_string(),
            judge_model: DEFAULT_FAST_MODEL.to_string(),
            temperature: 0.7,
            thinking_budget: 2048,
            timeout: Duration::from_secs(60),
            data_dir: PathBuf::from(".orion"),
            language: Language::En,
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {name} '{raw}', using default");
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            api_key: env::var("GEMINI_API_KEY").ok(),
            api_base: var_or("ORION_API_BASE", &defaults.api_base),
            optimizer_model: var_or("ORION_OPTIMIZER_MODEL", &defaults.optimizer_model),
            simulation_model: var_or("ORION_SIMULATION_MODEL", &defaults.simulation_model),
            judge_model: var_or("ORION_JUDGE_MODEL", &defaults.judge_model),
            temperature: parsed_or("ORION_TEMPERATURE", defaults.temperature),
            thinking_budget: parsed_or("ORION_THINKING_BUDGET", defaults.thinking_budget),
            timeout: Duration::from_secs(parsed_or("ORION_TIMEOUT_SECS", defaults.timeout.as_secs())),
            data_dir: PathBuf::from(var_or("ORION_DATA_DIR", ".orion")),
            language: parsed_or("ORION_LANG", defaults.language),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_ok()
    }

    /// The credential, or a configuration error if it is missing or malformed.
    pub fn api_key(&self) -> Result<&str, OrionError> {
        let key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OrionError::Config("GEMINI_API_KEY is not set".into()))?;

        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(OrionError::Config("GEMINI_API_KEY contains whitespace".into()));
        }
        Ok(key)
    }
}
