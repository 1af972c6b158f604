//! Chat configuration: one struct in place of a copy of the client per
//! provider/theme/feature combination.
//!
//! Loaded from TOML; every key is optional. API keys are read from the
//! environment by [`crate::providers::build_provider`], never from the file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::accumulator::{StreamFailurePolicy, DEFAULT_ERROR_MESSAGE};
use crate::error::ChatError;
use crate::providers::Provider;
use crate::ui::Theme;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    pub provider: Provider,
    /// `None` means the provider's default model.
    pub model: Option<String>,
    pub streaming: bool,
    pub theme: Theme,
    pub voice_enabled: bool,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    /// Shown in place of a reply when a single-shot request fails.
    pub error_message: String,
    /// What a mid-stream failure does to the partial reply.
    pub failure_policy: StreamFailurePolicy,
    /// Override the vendor endpoint root (proxies, local mocks).
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            provider: Provider::default(),
            model: None,
            streaming: true,
            theme: Theme::default(),
            voice_enabled: false,
            system_prompt: None,
            temperature: 0.7,
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            failure_policy: StreamFailurePolicy::default(),
            base_url: None,
            timeout_secs: 60,
        }
    }
}

impl ChatConfig {
    /// Read a config file, or return the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatError> {
        match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| ChatError::Config(format!("{}: {e}", p.display())))?;
                Self::from_toml(&text)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(text: &str) -> Result<Self, ChatError> {
        let config: ChatConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ChatError::Config("timeout_secs must be at least 1".into()));
        }
        if self.error_message.trim().is_empty() {
            return Err(ChatError::Config("error_message must not be empty".into()));
        }
        Ok(())
    }

    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Shown instead of a reply when the provider has no API key.
    pub fn missing_key_message(&self) -> String {
        format!(
            "Error: API key missing. Set {} and restart.",
            self.provider.api_key_env()
        )
    }
}
