use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATABASE_NAME: &str = "TodoDB";
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const LOCAL_ENV_FILE: &str = ".env.local";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DecompositionConfig {
    pub api_base_url: String,
    pub model: String,
    pub api_token: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_k: u32,
    pub top_p: f64,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_token: String::new(),
            temperature: 0.1,
            max_output_tokens: 2048,
            top_k: 1,
            top_p: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_name: String,
    pub schema_version: u32,
    pub scratch_namespace: String,
    pub log_filter: String,
    pub decomposition: DecompositionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            schema_version: DEFAULT_SCHEMA_VERSION,
            scratch_namespace: "scratch".to_string(),
            log_filter: "info".to_string(),
            decomposition: DecompositionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `.env.local` from the working directory, then overlays the process environment.
    pub fn from_env() -> Self {
        Self::from_env_file(Path::new(LOCAL_ENV_FILE))
    }

    /// Variables already present in the process environment win over the file.
    pub fn from_env_file(path: &Path) -> Self {
        match dotenvy::from_path(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "loaded env file"),
            Err(error) if error.not_found() => {}
            Err(error) => {
                tracing::warn!(path = %path.display(), error = %error, "failed to load env file")
            }
        }
        Self::from_process_env()
    }

    fn from_process_env() -> Self {
        let mut config = Self::default();
        if let Some(dir) = env_value("TODO_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = env_value("TODO_DB_NAME") {
            config.database_name = name;
        }
        if let Some(filter) = env_value("TODO_LOG") {
            config.log_filter = filter;
        }
        if let Some(model) = env_value("GEMINI_MODEL") {
            config.decomposition.model = model;
        }
        if let Some(token) = env_value("GEMINI_API_TOKEN") {
            config.decomposition.api_token = token;
        }
        if let Some(base) = env_value("GEMINI_API_BASE_URL") {
            config.decomposition.api_base_url = base;
        }
        config
    }

    /// Deep-merges a partial camelCase JSON object over this config.
    pub fn with_overrides(&self, update: serde_json::Value) -> AppResult<Self> {
        let mut merged = serde_json::to_value(self)?;
        merge_json(&mut merged, update);
        Ok(serde_json::from_value(merged)?)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite", self.database_name))
    }

    pub fn scratch_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite", self.scratch_namespace))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}
