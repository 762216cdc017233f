use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::notify::PermissionState;
use crate::notify::watcher::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_SERVER_THRESHOLD_SECS, DEFAULT_SHORT_THRESHOLD_SECS,
    Thresholds,
};

/// Alert lead times above a week are rejected.
const MAX_THRESHOLD_SECS: u64 = 7 * 86_400;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub version: u32,
    pub store_path: PathBuf,
    pub poll_interval_secs: u64,
    pub short_threshold_secs: u64,
    pub server_threshold_secs: u64,
    pub close_to_respawn_secs: i64,
    pub notification_icon: String,
    pub board_password: Option<String>,
    pub permission: PermissionState,
    pub push: Option<PushSettings>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PushSettings {
    pub user: String,
    pub token: String,
}

impl WatchConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds::from_secs(self.short_threshold_secs, self.server_threshold_secs)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            version: 1,
            store_path: PathBuf::from(default_store_path()),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            short_threshold_secs: DEFAULT_SHORT_THRESHOLD_SECS,
            server_threshold_secs: DEFAULT_SERVER_THRESHOLD_SECS,
            close_to_respawn_secs: default_close_to_respawn_secs(),
            notification_icon: default_notification_icon(),
            board_password: None,
            permission: PermissionState::Granted,
            push: None,
        }
    }
}

/// A missing file yields the defaults; a present but broken file is an error.
pub fn load_watch_config(path: &Path) -> Result<WatchConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(WatchConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    parse_watch_config_text(&content)
}

pub fn parse_watch_config_text(content: &str) -> Result<WatchConfig> {
    let raw = serde_json::from_str::<WatchConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported config version {}; expected version 1",
            raw.version
        );
    }
    if raw.poll_interval_secs == 0 {
        bail!("poll_interval_secs must be greater than zero");
    }
    for (name, value) in [
        ("short_threshold_secs", raw.short_threshold_secs),
        ("server_threshold_secs", raw.server_threshold_secs),
    ] {
        if value == 0 || value > MAX_THRESHOLD_SECS {
            bail!("{name} must be between 1 and {MAX_THRESHOLD_SECS}, got {value}");
        }
    }
    if raw.close_to_respawn_secs < 0 {
        bail!("close_to_respawn_secs must not be negative");
    }

    let board_password = raw
        .board_password
        .map(|password| password.trim().to_string())
        .filter(|password| !password.is_empty());
    let push = match (raw.push_user, raw.push_token) {
        (Some(user), Some(token)) => Some(PushSettings { user, token }),
        (None, None) => None,
        _ => bail!("push_user and push_token must be set together"),
    };

    Ok(WatchConfig {
        version: raw.version,
        store_path: PathBuf::from(raw.store_path),
        poll_interval_secs: raw.poll_interval_secs,
        short_threshold_secs: raw.short_threshold_secs,
        server_threshold_secs: raw.server_threshold_secs,
        close_to_respawn_secs: raw.close_to_respawn_secs,
        notification_icon: raw.notification_icon,
        board_password,
        permission: raw.permission,
        push,
    })
}

#[derive(Debug, Deserialize)]
struct WatchConfigFile {
    version: u32,
    #[serde(default = "default_store_path")]
    store_path: String,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
    #[serde(default = "default_short_threshold_secs")]
    short_threshold_secs: u64,
    #[serde(default = "default_server_threshold_secs")]
    server_threshold_secs: u64,
    #[serde(default = "default_close_to_respawn_secs")]
    close_to_respawn_secs: i64,
    #[serde(default = "default_notification_icon")]
    notification_icon: String,
    #[serde(default)]
    board_password: Option<String>,
    #[serde(default = "default_permission")]
    permission: PermissionState,
    #[serde(default)]
    push_user: Option<String>,
    #[serde(default)]
    push_token: Option<String>,
}

fn default_store_path() -> String {
    "timers.json".to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_short_threshold_secs() -> u64 {
    DEFAULT_SHORT_THRESHOLD_SECS
}

fn default_server_threshold_secs() -> u64 {
    DEFAULT_SERVER_THRESHOLD_SECS
}

fn default_close_to_respawn_secs() -> i64 {
    300
}

fn default_notification_icon() -> String {
    "/icons/icon-192x192.png".to_string()
}

fn default_permission() -> PermissionState {
    PermissionState::Granted
}
