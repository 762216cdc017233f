pub mod scheduler;
pub mod watcher;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Unsupported,
    Default,
    Denied,
    Granted,
    Loading,
}

impl PermissionState {
    pub fn allows_alerts(self) -> bool {
        matches!(self, PermissionState::Granted)
    }

    /// Persistent advisory shown while alerts are unavailable.
    pub fn advisory(self) -> Option<&'static str> {
        match self {
            PermissionState::Granted | PermissionState::Loading => None,
            PermissionState::Default => {
                Some("Enable notifications to get alerts before a boss respawns.")
            }
            PermissionState::Denied => Some(
                "Notifications are blocked. Countdowns still run, but no respawn alerts will be sent.",
            ),
            PermissionState::Unsupported => {
                Some("This host does not support notifications. Showing countdowns only.")
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
    /// Respawn the alert is about; same tag and respawn means same event.
    pub respawn_at: DateTime<Utc>,
}

impl Notification {
    pub fn respawning_soon(
        tag: &str,
        identity: &str,
        respawn_at: DateTime<Utc>,
        lead: chrono::Duration,
        icon: &str,
    ) -> Self {
        let minutes = ((lead.num_seconds() + 30) / 60).max(1);
        Self {
            title: format!("{identity} is respawning soon!"),
            body: format!("Respawn in approximately {minutes} minutes."),
            icon: icon.to_string(),
            tag: tag.to_string(),
            respawn_at,
        }
    }
}

/// Host alert surface. Raising is fire-and-forget; the surface collapses
/// notifications that share a tag.
pub trait NotificationSurface {
    fn permission_state(&self) -> PermissionState;
    fn request_permission(&mut self) -> PermissionState;
    fn raise(&mut self, notification: Notification);
}

/// Prints alerts to stdout. A tag holds one notification: raising the same
/// respawn again is dropped, a different respawn replaces it.
pub struct ConsoleSurface {
    permission: PermissionState,
    shown: HashMap<String, DateTime<Utc>>,
    delivered: u64,
}

impl ConsoleSurface {
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission,
            shown: HashMap::new(),
            delivered: 0,
        }
    }
}

impl NotificationSurface for ConsoleSurface {
    fn permission_state(&self) -> PermissionState {
        self.permission
    }

    fn request_permission(&mut self) -> PermissionState {
        if self.permission == PermissionState::Default {
            self.permission = PermissionState::Granted;
        }
        self.permission
    }

    fn raise(&mut self, notification: Notification) {
        if self.shown.get(&notification.tag) == Some(&notification.respawn_at) {
            tracing::debug!(tag = %notification.tag, "collapsed duplicate notification");
            return;
        }
        self.shown
            .insert(notification.tag.clone(), notification.respawn_at);
        self.delivered += 1;
        tracing::info!(
            tag = %notification.tag,
            icon = %notification.icon,
            delivered = self.delivered,
            "notification raised"
        );
        println!("[ALERT] {} {}", notification.title, notification.body);
    }
}

/// Records everything raised, for assertions.
#[cfg(test)]
pub struct RecordingSurface {
    pub permission: PermissionState,
    pub raised: Vec<Notification>,
}

#[cfg(test)]
impl RecordingSurface {
    pub fn granted() -> Self {
        Self {
            permission: PermissionState::Granted,
            raised: Vec::new(),
        }
    }

    pub fn tags(&self) -> Vec<&str> {
        self.raised.iter().map(|n| n.tag.as_str()).collect()
    }
}

#[cfg(test)]
impl NotificationSurface for RecordingSurface {
    fn permission_state(&self) -> PermissionState {
        self.permission
    }

    fn request_permission(&mut self) -> PermissionState {
        self.permission
    }

    fn raise(&mut self, notification: Notification) {
        self.raised.push(notification);
    }
}

/// Optional push-delivery hookup. Registration is opaque to the core.
pub trait PushRegistrar {
    fn register(&mut self, user: &str, token: &str) -> Result<()>;
}

pub struct LogPushRegistrar;

impl PushRegistrar for LogPushRegistrar {
    fn register(&mut self, user: &str, token: &str) -> Result<()> {
        tracing::info!(user, token_len = token.len(), "push token registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn respawn() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0)
            .single()
            .expect("valid")
    }

    #[test]
    fn respawning_soon_rounds_lead_to_minutes() {
        let short = Notification::respawning_soon(
            "normal-1-warlord",
            "[Normal] Warlord - 1F",
            respawn(),
            chrono::Duration::seconds(180),
            "/icon.png",
        );
        assert_eq!(short.title, "[Normal] Warlord - 1F is respawning soon!");
        assert_eq!(short.body, "Respawn in approximately 3 minutes.");
        assert_eq!(short.tag, "normal-1-warlord");

        let long = Notification::respawning_soon(
            "server-vale",
            "Vale of Ragnarok",
            respawn(),
            chrono::Duration::seconds(900),
            "/icon.png",
        );
        assert_eq!(long.body, "Respawn in approximately 15 minutes.");
    }

    #[test]
    fn only_granted_allows_alerts() {
        assert!(PermissionState::Granted.allows_alerts());
        for state in [
            PermissionState::Unsupported,
            PermissionState::Default,
            PermissionState::Denied,
            PermissionState::Loading,
        ] {
            assert!(!state.allows_alerts());
        }
        assert!(PermissionState::Denied.advisory().is_some());
        assert!(PermissionState::Granted.advisory().is_none());
    }

    #[test]
    fn console_request_grants_only_from_default() {
        let mut pending = ConsoleSurface::new(PermissionState::Default);
        assert_eq!(pending.request_permission(), PermissionState::Granted);
        let mut denied = ConsoleSurface::new(PermissionState::Denied);
        assert_eq!(denied.request_permission(), PermissionState::Denied);
    }

    #[test]
    fn console_collapses_same_tag() {
        let mut surface = ConsoleSurface::new(PermissionState::Granted);
        let alert = Notification::respawning_soon(
            "server-vale",
            "Vale of Ragnarok",
            respawn(),
            chrono::Duration::seconds(900),
            "/icon.png",
        );
        surface.raise(alert.clone());
        surface.raise(alert);
        assert_eq!(surface.shown.len(), 1);
        assert_eq!(surface.delivered, 1);
    }

    #[test]
    fn console_delivers_superseding_respawn_for_same_tag() {
        let mut surface = ConsoleSurface::new(PermissionState::Granted);
        let lead = chrono::Duration::seconds(180);
        let first = Notification::respawning_soon(
            "normal-1-warlord",
            "[Normal] Warlord - 1F",
            respawn(),
            lead,
            "/icon.png",
        );
        surface.raise(first);

        // Defeat re-timed ten minutes later: a new event under the same tag.
        let retimed = respawn() + chrono::Duration::minutes(10);
        let second = Notification::respawning_soon(
            "normal-1-warlord",
            "[Normal] Warlord - 1F",
            retimed,
            lead,
            "/icon.png",
        );
        surface.raise(second.clone());
        assert_eq!(surface.delivered, 2);
        assert_eq!(surface.shown.get("normal-1-warlord"), Some(&retimed));

        surface.raise(second);
        assert_eq!(surface.delivered, 2);
    }
}
