//! Model variant definitions
//!
//! The chat offers exactly two Gemini tiers. The higher tier gets a
//! thinking budget and a raw trace view next to its final answer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Thinking budget handed to the higher-capability tier by default.
pub const DEFAULT_PRO_RESPONSE_BUDGET: u32 = 32_768;

/// Selectable model variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    #[default]
    Flash,
    Pro,
}

impl ModelVariant {
    pub fn all() -> &'static [ModelVariant] {
        &[ModelVariant::Flash, ModelVariant::Pro]
    }

    /// Short identifier used on the HTTP surface
    pub fn id(self) -> &'static str {
        match self {
            ModelVariant::Flash => "flash",
            ModelVariant::Pro => "pro",
        }
    }

    /// Model name used by the Gemini API
    pub fn api_name(self) -> &'static str {
        match self {
            ModelVariant::Flash => "gemini-2.5-flash",
            ModelVariant::Pro => "gemini-2.5-pro",
        }
    }

    /// Label shown next to the product name in the header
    pub fn display_name(self) -> &'static str {
        match self {
            ModelVariant::Flash => "Flash",
            ModelVariant::Pro => "Pro",
        }
    }

    /// Label shown in the model picker
    pub fn menu_label(self) -> &'static str {
        match self {
            ModelVariant::Flash => "Gemini Flash",
            ModelVariant::Pro => "Gemini Pro",
        }
    }

    /// Whether bot entries from this variant show the raw thinking trace
    pub fn shows_thinking_trace(self) -> bool {
        matches!(self, ModelVariant::Pro)
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error for unrecognized variant names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model variant: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for ModelVariant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flash" | "gemini-2.5-flash" => Ok(ModelVariant::Flash),
            "pro" | "gemini-2.5-pro" => Ok(ModelVariant::Pro),
            _ => Err(UnknownVariant(s.to_string())),
        }
    }
}

/// Options recognized when creating a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionConfig {
    /// Upper bound on internal reasoning effort, in tokens
    pub response_budget: Option<u32>,
}

impl SessionConfig {
    /// Configuration for `variant`, with `pro_budget` applied to the higher tier.
    pub fn for_variant(variant: ModelVariant, pro_budget: u32) -> Self {
        match variant {
            ModelVariant::Flash => Self::default(),
            ModelVariant::Pro => Self {
                response_budget: Some(pro_budget),
            },
        }
    }
}
