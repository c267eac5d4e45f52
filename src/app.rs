use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::BaseDirs;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::api::models::SenderRole;
use crate::chat::{PollSettings, Principal};
use crate::error::ChatError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub message_interval_ms: u64,
    pub conversation_interval_ms: u64,
    pub message_limit: u32,
    pub request_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            message_interval_ms: 3_000,
            conversation_interval_ms: 5_000,
            message_limit: 50,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub display_name: String,
    pub role: SenderRole,
    pub polling: PollingConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            display_name: String::new(),
            role: SenderRole::User,
            polling: PollingConfig::default(),
        }
    }
}

impl ChatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("support-chat.toml"))
    }

    /// Load from the user config dir, then apply environment overrides. A
    /// missing or unreadable file yields defaults.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("ignoring {}: {e}", path.display());
                Self::new()
            }),
            _ => Self::new(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn load_from(path: &Path) -> Result<Self, ChatError> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("SUPPORT_CHAT_URL") {
            self.base_url = crate::utils::normalize_url(&url);
        }
        if let Some(token) = var("SUPPORT_CHAT_TOKEN") {
            self.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(role) = var("SUPPORT_CHAT_ROLE") {
            match role.to_ascii_lowercase().as_str() {
                "admin" => self.role = SenderRole::Admin,
                "user" => self.role = SenderRole::User,
                other => warn!("unknown SUPPORT_CHAT_ROLE {other:?}, keeping {}", self.role.as_str()),
            }
        }
    }

    pub fn save(&self) -> Result<(), ChatError> {
        let path = Self::config_path().ok_or_else(|| ChatError::Config("no config dir".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        fs::write(path, toml)?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        !self.base_url.is_empty() && self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn principal(&self) -> Principal {
        match self.role {
            SenderRole::User => {
                let name = if self.display_name.is_empty() { "You" } else { &self.display_name };
                Principal::user(name)
            }
            // the server stamps every admin message as "Admin"
            SenderRole::Admin => Principal::admin("Admin"),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            message_interval: Duration::from_millis(self.polling.message_interval_ms.max(250)),
            conversation_interval: Duration::from_millis(self.polling.conversation_interval_ms.max(250)),
            message_limit: self.polling.message_limit.max(1),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.request_timeout_secs.max(1))
    }
}
