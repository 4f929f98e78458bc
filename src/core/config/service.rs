use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::defaults::{default_config, API_KEY_ENV};
use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::validate_config;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "access_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("IPAD_CHATBOT_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let data_config = self.paths.data_dir.join("config.yml");
        if data_config.exists() {
            return data_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Defaults, then `config.yml`, then `secrets.yaml`, then environment overrides.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let merged = deep_merge(&default_config(), &public_config);
        let merged = deep_merge(&merged, &secrets_config);
        Ok(deep_merge(&merged, &env_overrides()))
    }

    /// Loads, validates and deserialises the effective configuration.
    pub fn load_settings(&self) -> Result<AppConfig, ApiError> {
        let config = self.load_config()?;
        validate_config(&config)?;
        serde_json::from_value(config).map_err(ApiError::configuration)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ApiError::Configuration(format!("failed to read {}: {}", path.display(), e))
    })?;
    if contents.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    match serde_yaml::from_str::<Value>(&contents) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(_) => Err(ApiError::Configuration(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
        Err(e) => Err(ApiError::Configuration(format!(
            "failed to parse {}: {}",
            path.display(),
            e
        ))),
    }
}

fn env_overrides() -> Value {
    let mut root = Map::new();

    if let Ok(key) = env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            let mut llm = Map::new();
            llm.insert("api_key".to_string(), Value::String(key));
            root.insert("llm".to_string(), Value::Object(llm));
        }
    }

    if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
        let mut server = Map::new();
        server.insert("port".to_string(), Value::from(port));
        root.insert("server".to_string(), Value::Object(server));
    }

    Value::Object(root)
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}
