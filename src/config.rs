//! Application configuration from environment variables

use crate::chat::DEFAULT_IDLE_TIMEOUT;
use crate::llm::{ModelVariant, DEFAULT_GEMINI_BASE_URL, DEFAULT_PRO_RESPONSE_BUDGET};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Gemini credential; without it every reply fails
    pub api_key: Option<String>,
    pub base_url: String,
    pub initial_variant: ModelVariant,
    pub port: u16,
    /// Render finished answers as markdown rather than escaped text
    pub markdown: bool,
    pub pro_budget: u32,
    /// Longest silence tolerated inside a streaming reply
    pub idle_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            initial_variant: ModelVariant::default(),
            port: DEFAULT_PORT,
            markdown: true,
            pro_budget: DEFAULT_PRO_RESPONSE_BUDGET,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Malformed values fall back
    /// to their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let initial_variant = match var("SUPERNOVA_MODEL") {
            Some(raw) => raw.parse::<ModelVariant>().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Ignoring SUPERNOVA_MODEL");
                defaults.initial_variant
            }),
            None => defaults.initial_variant,
        };

        Self {
            api_key: var("GEMINI_API_KEY").or_else(|| var("API_KEY")),
            base_url: var("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            initial_variant,
            port: parse_or("SUPERNOVA_PORT", var("SUPERNOVA_PORT"), defaults.port),
            markdown: var("SUPERNOVA_MARKDOWN").map_or(defaults.markdown, |v| {
                !matches!(v.trim().to_ascii_lowercase().as_str(), "off" | "false" | "0")
            }),
            pro_budget: parse_or(
                "SUPERNOVA_PRO_BUDGET",
                var("SUPERNOVA_PRO_BUDGET"),
                defaults.pro_budget,
            ),
            idle_timeout: Duration::from_secs(parse_or(
                "SUPERNOVA_IDLE_TIMEOUT_SECS",
                var("SUPERNOVA_IDLE_TIMEOUT_SECS"),
                defaults.idle_timeout.as_secs(),
            )),
        }
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Ignoring malformed value");
            default
        }),
        None => default,
    }
}
