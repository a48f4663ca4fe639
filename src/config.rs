use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ConfigError;
use crate::record::UserId;

/// Longest ladder whose bet `2^(level-1)` still fits in a u64
pub const MAX_LADDER_LEVEL: u32 = 64;

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telegram Bot API configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Administrator identity
    #[serde(default)]
    pub admin: AdminConfig,

    /// VIP sales details shown to users
    #[serde(default)]
    pub vip: VipConfig,

    /// Ladder lengths per mode
    #[serde(default)]
    pub ladder: LadderConfig,

    /// User store location
    #[serde(default)]
    pub store: StoreConfig,

    /// Heartbeat interval for metric logging
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Usually supplied through BOT_TOKEN instead of the file
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Numeric Telegram id allowed to run admin commands
    #[serde(default)]
    pub id: UserId,
    /// Handle without the leading @
    #[serde(default = "default_admin_username")]
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VipConfig {
    #[serde(default = "default_vip_price")]
    pub price: String,
    #[serde(default = "default_vip_upi")]
    pub upi: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LadderConfig {
    #[serde(default = "default_free_max_level")]
    pub free_max_level: u32,
    #[serde(default = "default_vip_max_level")]
    pub vip_max_level: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot path; `None` keeps users in memory only
    #[serde(default = "default_store_path")]
    pub path: Option<PathBuf>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_vip_price() -> String {
    "₹99 / Month".to_string()
}

fn default_vip_upi() -> String {
    "payee@upi".to_string()
}

fn default_free_max_level() -> u32 {
    7
}

fn default_vip_max_level() -> u32 {
    5
}

fn default_store_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/users.json"))
}

fn default_heartbeat_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            admin: AdminConfig::default(),
            vip: VipConfig::default(),
            ladder: LadderConfig::default(),
            store: StoreConfig::default(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            id: 0,
            username: default_admin_username(),
        }
    }
}

impl Default for VipConfig {
    fn default() -> Self {
        Self {
            price: default_vip_price(),
            upi: default_vip_upi(),
        }
    }
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            free_max_level: default_free_max_level(),
            vip_max_level: default_vip_max_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl LadderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("free_max_level", self.free_max_level),
            ("vip_max_level", self.vip_max_level),
        ] {
            if !(1..=MAX_LADDER_LEVEL).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "ladder.{name} must be between 1 and {MAX_LADDER_LEVEL}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.ladder.validate()?;
        info!(admin_id = config.admin.id, "configuration loaded");
        Ok(config)
    }

    /// Resolve the bot token, preferring an explicit override
    pub fn token(&self, override_token: Option<&str>) -> Result<String, ConfigError> {
        override_token
            .map(str::to_string)
            .or_else(|| self.telegram.token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken)
    }
}
