use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::notify::{Notification, NotificationSurface, PermissionState};

/// Identifies one pending deferred alert.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct AlertHandle(u64);

#[derive(Debug, Clone)]
pub struct ScheduledAlert {
    pub boss_key: String,
    pub identity: String,
    pub respawn_at: DateTime<Utc>,
    pub alert_at: DateTime<Utc>,
    pub lead: chrono::Duration,
    pub handle: AlertHandle,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ScheduleOutcome {
    PermissionMissing,
    WindowPassed,
    AlreadyScheduled,
    Installed(AlertHandle),
    Replaced {
        cancelled: AlertHandle,
        installed: AlertHandle,
    },
}

/// Per-view registry of pending "respawning soon" alerts, at most one per
/// boss key.
pub struct AlertScheduler {
    permission: PermissionState,
    icon: String,
    alerts: HashMap<String, ScheduledAlert>,
    next_handle: u64,
}

impl AlertScheduler {
    pub fn new(permission: PermissionState, icon: &str) -> Self {
        Self {
            permission,
            icon: icon.to_string(),
            alerts: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn schedule_alert(
        &mut self,
        boss_key: &str,
        identity: &str,
        respawn_at: DateTime<Utc>,
        threshold: chrono::Duration,
        now: DateTime<Utc>,
    ) -> ScheduleOutcome {
        if !self.permission.allows_alerts() {
            return ScheduleOutcome::PermissionMissing;
        }
        let Some(alert_at) = respawn_at.checked_sub_signed(threshold) else {
            return ScheduleOutcome::WindowPassed;
        };
        if alert_at <= now {
            return ScheduleOutcome::WindowPassed;
        }
        let cancelled = match self.alerts.get(boss_key) {
            Some(existing) if existing.alert_at == alert_at => {
                return ScheduleOutcome::AlreadyScheduled;
            }
            Some(existing) => Some(existing.handle),
            None => None,
        };

        let handle = AlertHandle(self.next_handle);
        self.next_handle += 1;
        self.alerts.insert(
            boss_key.to_string(),
            ScheduledAlert {
                boss_key: boss_key.to_string(),
                identity: identity.to_string(),
                respawn_at,
                alert_at,
                lead: threshold,
                handle,
            },
        );
        tracing::debug!(boss = boss_key, %alert_at, "respawn alert scheduled");
        match cancelled {
            Some(cancelled) => ScheduleOutcome::Replaced {
                cancelled,
                installed: handle,
            },
            None => ScheduleOutcome::Installed(handle),
        }
    }

    /// Fires every alert whose instant has been reached, oldest first. Late
    /// alerts still fire.
    pub fn fire_due(&mut self, now: DateTime<Utc>, surface: &mut dyn NotificationSurface) -> usize {
        let mut due = self
            .alerts
            .values()
            .filter(|alert| alert.alert_at <= now)
            .map(|alert| (alert.alert_at, alert.boss_key.clone()))
            .collect::<Vec<_>>();
        due.sort();

        for (_, key) in &due {
            let Some(alert) = self.alerts.remove(key) else {
                continue;
            };
            tracing::info!(boss = %alert.boss_key, respawn_at = %alert.respawn_at, "respawn alert fired");
            surface.raise(Notification::respawning_soon(
                &alert.boss_key,
                &alert.identity,
                alert.respawn_at,
                alert.lead,
                &self.icon,
            ));
        }
        due.len()
    }

    pub fn cancel(&mut self, boss_key: &str) -> Option<AlertHandle> {
        self.alerts.remove(boss_key).map(|alert| alert.handle)
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.alerts.len();
        self.alerts.clear();
        cancelled
    }

    #[cfg(test)]
    pub fn get(&self, boss_key: &str) -> Option<&ScheduledAlert> {
        self.alerts.get(boss_key)
    }

    #[cfg(test)]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.alerts.values().map(|alert| alert.alert_at).min()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::notify::RecordingSurface;

    const KEY: &str = "normal-1-warlord";
    const IDENTITY: &str = "[Normal] Warlord - 1F";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 14, 9, 0, 0)
            .single()
            .expect("valid")
    }

    fn scheduler() -> AlertScheduler {
        AlertScheduler::new(PermissionState::Granted, "/icon.png")
    }

    #[test]
    fn repeated_scheduling_is_idempotent() {
        let mut alerts = scheduler();
        let respawn = now() + Duration::hours(2);
        let threshold = Duration::seconds(180);
        assert!(matches!(
            alerts.schedule_alert(KEY, IDENTITY, respawn, threshold, now()),
            ScheduleOutcome::Installed(_)
        ));
        assert_eq!(
            alerts.schedule_alert(KEY, IDENTITY, respawn, threshold, now()),
            ScheduleOutcome::AlreadyScheduled
        );
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn new_respawn_supersedes_previous_alert() {
        let mut alerts = scheduler();
        let threshold = Duration::seconds(180);
        let first = now() + Duration::hours(2);
        let second = now() + Duration::hours(3);
        let ScheduleOutcome::Installed(old) =
            alerts.schedule_alert(KEY, IDENTITY, first, threshold, now())
        else {
            panic!("first alert should install");
        };
        let outcome = alerts.schedule_alert(KEY, IDENTITY, second, threshold, now());
        assert!(matches!(outcome, ScheduleOutcome::Replaced { cancelled, .. } if cancelled == old));
        assert_eq!(alerts.len(), 1);
        assert_eq!(
            alerts.get(KEY).map(|alert| alert.alert_at),
            Some(second - threshold)
        );

        // The superseded instant passes without anything firing.
        let mut surface = RecordingSurface::granted();
        assert_eq!(alerts.fire_due(first - threshold, &mut surface), 0);
        assert!(surface.raised.is_empty());
        assert_eq!(alerts.fire_due(second - threshold, &mut surface), 1);
        assert_eq!(surface.tags(), vec![KEY]);
    }

    #[test]
    fn never_schedules_into_the_past() {
        let mut alerts = scheduler();
        let threshold = Duration::seconds(180);
        let respawn = now() + Duration::seconds(180);
        assert_eq!(
            alerts.schedule_alert(KEY, IDENTITY, respawn, threshold, now()),
            ScheduleOutcome::WindowPassed
        );
        assert_eq!(
            alerts.schedule_alert(KEY, IDENTITY, now() - Duration::hours(1), threshold, now()),
            ScheduleOutcome::WindowPassed
        );
        assert!(alerts.is_empty());
        let mut surface = RecordingSurface::granted();
        assert_eq!(alerts.fire_due(now() + Duration::hours(1), &mut surface), 0);
        assert!(surface.raised.is_empty());
    }

    #[test]
    fn respawn_at_start_of_calendar_counts_as_passed() {
        let mut alerts = scheduler();
        assert_eq!(
            alerts.schedule_alert(
                KEY,
                IDENTITY,
                DateTime::<Utc>::MIN_UTC,
                Duration::seconds(900),
                now()
            ),
            ScheduleOutcome::WindowPassed
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn without_permission_scheduling_is_a_no_op() {
        let mut alerts = AlertScheduler::new(PermissionState::Denied, "/icon.png");
        assert_eq!(
            alerts.schedule_alert(
                KEY,
                IDENTITY,
                now() + Duration::hours(2),
                Duration::seconds(180),
                now()
            ),
            ScheduleOutcome::PermissionMissing
        );
        assert!(alerts.is_empty());
    }

    #[test]
    fn fired_alert_leaves_registry_and_can_rearm() {
        let mut alerts = scheduler();
        let threshold = Duration::seconds(180);
        let respawn = now() + Duration::hours(2);
        alerts.schedule_alert(KEY, IDENTITY, respawn, threshold, now());

        let mut surface = RecordingSurface::granted();
        assert_eq!(alerts.fire_due(respawn - threshold - Duration::seconds(1), &mut surface), 0);
        assert_eq!(alerts.fire_due(respawn - threshold, &mut surface), 1);
        assert!(alerts.is_empty());
        assert_eq!(surface.raised[0].body, "Respawn in approximately 3 minutes.");

        let next_cycle = respawn + Duration::hours(2);
        assert!(matches!(
            alerts.schedule_alert(KEY, IDENTITY, next_cycle, threshold, respawn),
            ScheduleOutcome::Installed(_)
        ));
    }

    #[test]
    fn cancel_all_prevents_any_firing() {
        let mut alerts = scheduler();
        let threshold = Duration::seconds(180);
        alerts.schedule_alert(KEY, IDENTITY, now() + Duration::hours(2), threshold, now());
        alerts.schedule_alert(
            "inter-1-skald",
            "[Inter] Skald - 1F",
            now() + Duration::hours(8),
            threshold,
            now(),
        );
        assert_eq!(alerts.next_due(), Some(now() + Duration::hours(2) - threshold));
        assert_eq!(alerts.cancel_all(), 2);

        let mut surface = RecordingSurface::granted();
        assert_eq!(alerts.fire_due(now() + Duration::hours(9), &mut surface), 0);
        assert!(surface.raised.is_empty());
    }

    #[test]
    fn late_wakeup_fires_in_due_order() {
        let mut alerts = scheduler();
        let threshold = Duration::seconds(180);
        alerts.schedule_alert("b", "B", now() + Duration::hours(3), threshold, now());
        alerts.schedule_alert("a", "A", now() + Duration::hours(2), threshold, now());
        let mut surface = RecordingSurface::granted();
        assert_eq!(alerts.fire_due(now() + Duration::hours(5), &mut surface), 2);
        assert_eq!(surface.tags(), vec!["a", "b"]);
    }
}
