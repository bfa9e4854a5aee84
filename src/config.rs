//! Pipeline configuration parsed from environment variables.

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::llm::LlmChat;
use crate::normalize::{DEFAULT_BIND_RADIUS, Normalizer, Theme};
use crate::repair::{DEFAULT_MAX_REPAIRS, DEFAULT_REPAIR_MAX_TOKENS, LlmRepairer, RepairCoordinator};
use crate::stream::IngestOptions;

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: expected true/false/1/0, got `{value}`")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key}: expected a #rgb, #rrggbb or #rrggbbaa color, got `{value}`")]
    InvalidColor { key: &'static str, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBool { .. } => "E_CONFIG_BOOL",
            Self::InvalidColor { .. } => "E_CONFIG_COLOR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub theme: Theme,
    pub bind_radius: f64,
    pub max_repairs: usize,
    pub repair_max_tokens: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            bind_radius: DEFAULT_BIND_RADIUS,
            max_repairs: DEFAULT_MAX_REPAIRS,
            repair_max_tokens: DEFAULT_REPAIR_MAX_TOKENS,
        }
    }
}

impl PipelineConfig {
    /// Build typed pipeline config from environment variables.
    ///
    /// Optional:
    /// - `DRAWKIT_DARK_MODE`: `true`/`false`/`1`/`0`, default false
    /// - `DRAWKIT_STROKE_COLOR`: preferred stroke, theme default when absent
    /// - `DRAWKIT_BIND_RADIUS`: default 80
    /// - `DRAWKIT_MAX_REPAIRS`: default 10
    /// - `DRAWKIT_REPAIR_MAX_TOKENS`: default 4096
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unparseable dark-mode flag or color.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`] over an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for an unparseable dark-mode flag or color.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let dark = parse_bool("DRAWKIT_DARK_MODE", lookup("DRAWKIT_DARK_MODE"))?;
        let preferred_stroke = lookup("DRAWKIT_STROKE_COLOR")
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_color("DRAWKIT_STROKE_COLOR", v))
            .transpose()?;

        let bind_radius = parse_or("DRAWKIT_BIND_RADIUS", &lookup, DEFAULT_BIND_RADIUS);
        Ok(Self {
            theme: Theme { dark, preferred_stroke },
            bind_radius: if bind_radius.is_finite() && bind_radius >= 0.0 { bind_radius } else { DEFAULT_BIND_RADIUS },
            max_repairs: parse_or("DRAWKIT_MAX_REPAIRS", &lookup, DEFAULT_MAX_REPAIRS),
            repair_max_tokens: parse_or("DRAWKIT_REPAIR_MAX_TOKENS", &lookup, DEFAULT_REPAIR_MAX_TOKENS),
        })
    }

    #[must_use]
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.theme.clone()).with_bind_radius(self.bind_radius)
    }

    /// Coordinator capped at `max_repairs`, completing records with `options`.
    #[must_use]
    pub fn repair_coordinator(&self, options: IngestOptions) -> RepairCoordinator {
        RepairCoordinator::new(options).with_max_attempts(self.max_repairs)
    }

    #[must_use]
    pub fn llm_repairer(&self, llm: Arc<dyn LlmChat>) -> LlmRepairer {
        LlmRepairer::new(llm).with_max_tokens(self.repair_max_tokens)
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key).and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(key: &'static str, raw: Option<String>) -> Result<bool, ConfigError> {
    let Some(raw) = raw else { return Ok(false) };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" => Ok(false),
        "true" | "1" => Ok(true),
        _ => Err(ConfigError::InvalidBool { key, value: raw }),
    }
}

fn parse_color(key: &'static str, raw: String) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let valid = trimmed
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()));
    if valid { Ok(trimmed.to_owned()) } else { Err(ConfigError::InvalidColor { key, value: raw }) }
}
