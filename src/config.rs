//! Configuration Resolver — environment variables layered over an
//! optional on-disk YAML file, producing validated provider configs.
//!
//! Grounded on the daemon's `Config::from_env` convention; the Keychain
//! reconciliation that convention also did has no counterpart here since
//! provider credentials are plain config values, not vault-encrypted
//! secrets (see DESIGN.md).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::ProviderConfig;

const KNOWN_PROVIDERS: [&str; 4] = ["groq", "deepseek", "gemini", "local"];

#[derive(Debug, Clone)]
pub struct EnhancementConfig {
    pub enabled: bool,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub use_vision_when_available: bool,
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct FileOverlay {
    #[serde(default)]
    providers_priority: HashMap<String, i32>,
}

impl EnhancementConfig {
    /// Read `ENHANCEMENT_*` and per-provider `<PROVIDER>_*` environment
    /// variables, then overlay an optional YAML file (only
    /// `providers_priority` is sourced from the file today — everything
    /// else is environment-only).
    pub fn from_env(yaml_path: Option<&Path>) -> Result<Self> {
        let enabled = env_bool("ENHANCEMENT_ENABLED", true);
        let timeout_seconds = env_u64("ENHANCEMENT_TIMEOUT_SECONDS", 30);
        let max_retries = env_u64("ENHANCEMENT_MAX_RETRIES", 2) as u32;
        let use_vision_when_available = env_bool("ENHANCEMENT_USE_VISION_WHEN_AVAILABLE", true);

        let overlay = match yaml_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&contents).context("parsing config YAML")?
            }
            _ => FileOverlay::default(),
        };

        let mut providers = Vec::new();
        for name in KNOWN_PROVIDERS {
            let upper = name.to_uppercase();
            let priority = overlay
                .providers_priority
                .get(name)
                .copied()
                .unwrap_or_else(|| default_priority(name));

            let credential = std::env::var(format!("{upper}_API_KEY")).ok();
            let base_url = std::env::var(format!("{upper}_BASE_URL")).unwrap_or_else(|_| default_base_url(name));
            let text_model = std::env::var(format!("{upper}_TEXT_MODEL")).unwrap_or_else(|_| default_text_model(name));
            let vision_model = std::env::var(format!("{upper}_VISION_MODEL"))
                .ok()
                .or_else(|| default_vision_model(name));
            let code_model = std::env::var(format!("{upper}_CODE_MODEL"))
                .ok()
                .or_else(|| default_code_model(name));

            // "local" needs no credential and is on by default; every
            // other provider is enabled once its API key is present,
            // regardless of whether the YAML overlay mentions it.
            let enabled = name == "local" || credential.is_some();

            providers.push(ProviderConfig {
                name: name.to_string(),
                enabled,
                credential,
                base_url,
                text_model,
                vision_model,
                code_model,
                priority,
                timeout: Duration::from_secs(timeout_seconds),
                max_retries,
            });
        }

        Ok(Self {
            enabled,
            timeout_seconds,
            max_retries,
            use_vision_when_available,
            providers,
        })
    }

    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled).collect()
    }
}

fn default_priority(name: &str) -> i32 {
    match name {
        "groq" => 1,
        "deepseek" => 2,
        "gemini" => 3,
        "local" => 4,
        _ => 99,
    }
}

fn default_base_url(name: &str) -> String {
    match name {
        "groq" => "https://api.groq.com/openai/v1".to_string(),
        "deepseek" => "https://api.deepseek.com".to_string(),
        "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        "local" => "http://127.0.0.1:8080/v1".to_string(),
        _ => String::new(),
    }
}

fn default_text_model(name: &str) -> String {
    match name {
        "groq" => "llama-3.3-70b-versatile".to_string(),
        "deepseek" => "deepseek-chat".to_string(),
        "gemini" => "gemini-2.5-flash".to_string(),
        "local" => "local-model".to_string(),
        _ => String::new(),
    }
}

fn default_vision_model(name: &str) -> Option<String> {
    match name {
        "gemini" => Some("gemini-2.5-flash".to_string()),
        "local" => Some("local-vision-model".to_string()),
        _ => None,
    }
}

fn default_code_model(name: &str) -> Option<String> {
    match name {
        "deepseek" => Some("deepseek-coder".to_string()),
        _ => None,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
