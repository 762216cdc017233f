use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::boss::model::{BossCategory, BossDefinition};
use crate::boss::roster::Roster;
use crate::notify::{Notification, NotificationSurface};
use crate::store::TimerRecord;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_SHORT_THRESHOLD_SECS: u64 = 180;
pub const DEFAULT_SERVER_THRESHOLD_SECS: u64 = 900;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum WatchState {
    #[default]
    NotNotified,
    Notified,
}

/// Lead times per boss category.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Thresholds {
    pub short: chrono::Duration,
    pub server: chrono::Duration,
}

impl Thresholds {
    pub fn from_secs(short_secs: u64, server_secs: u64) -> Self {
        Self {
            short: secs_to_duration(short_secs),
            server: secs_to_duration(server_secs),
        }
    }

    pub fn for_category(&self, category: BossCategory) -> chrono::Duration {
        match category {
            BossCategory::Normal | BossCategory::Inter => self.short,
            BossCategory::Server => self.server,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from_secs(DEFAULT_SHORT_THRESHOLD_SECS, DEFAULT_SERVER_THRESHOLD_SECS)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PollOutcome {
    pub observed: usize,
    pub notified: usize,
    pub rearmed: usize,
}

/// Background backstop that raises alerts for every boss, whether or not a
/// board view is showing it. State is in memory only.
pub struct GlobalWatcher {
    thresholds: Thresholds,
    interval: chrono::Duration,
    icon: String,
    states: HashMap<String, WatchState>,
    next_poll: Option<DateTime<Utc>>,
}

impl GlobalWatcher {
    pub fn new(thresholds: Thresholds, interval_secs: u64, icon: &str) -> Self {
        Self {
            thresholds,
            interval: secs_to_duration(interval_secs.max(1)),
            icon: icon.to_string(),
            states: HashMap::new(),
            next_poll: None,
        }
    }

    pub fn state(&self, boss_key: &str) -> WatchState {
        self.states.get(boss_key).copied().unwrap_or_default()
    }

    pub fn observe(
        &mut self,
        boss: &BossDefinition,
        respawn_at: DateTime<Utc>,
        now: DateTime<Utc>,
        surface: &mut dyn NotificationSurface,
    ) -> Option<WatchState> {
        let time_left = respawn_at - now;
        let current = self.state(&boss.id);
        if time_left <= chrono::Duration::zero() {
            if current == WatchState::Notified {
                self.states.insert(boss.id.clone(), WatchState::NotNotified);
                tracing::debug!(boss = %boss.id, "watcher re-armed after respawn");
                return Some(WatchState::NotNotified);
            }
            return None;
        }

        let threshold = self.thresholds.for_category(boss.category);
        if time_left <= threshold && current == WatchState::NotNotified {
            surface.raise(Notification::respawning_soon(
                &boss.id,
                &boss.display_identity(),
                respawn_at,
                threshold,
                &self.icon,
            ));
            self.states.insert(boss.id.clone(), WatchState::Notified);
            tracing::info!(boss = %boss.id, seconds_left = time_left.num_seconds(), "watcher raised respawn alert");
            return Some(WatchState::Notified);
        }
        None
    }

    pub fn poll(
        &mut self,
        roster: &Roster,
        records: &[(String, TimerRecord)],
        now: DateTime<Utc>,
        surface: &mut dyn NotificationSurface,
    ) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        for (boss_id, record) in records {
            let Some(boss) = roster.get(boss_id) else {
                continue;
            };
            let Some(respawn_at) = boss.respawn_instant(Some(record)) else {
                continue;
            };
            outcome.observed += 1;
            match self.observe(boss, respawn_at, now, surface) {
                Some(WatchState::Notified) => outcome.notified += 1,
                Some(WatchState::NotNotified) => outcome.rearmed += 1,
                None => {}
            }
        }
        outcome
    }

    /// Polls on the fixed cadence; the first call polls immediately.
    pub fn poll_if_due(
        &mut self,
        roster: &Roster,
        records: impl FnOnce() -> Vec<(String, TimerRecord)>,
        now: DateTime<Utc>,
        surface: &mut dyn NotificationSurface,
    ) -> Option<PollOutcome> {
        if self.next_poll.is_some_and(|due| now < due) {
            return None;
        }
        self.next_poll = Some(now + self.interval);
        Some(self.poll(roster, &records(), now, surface))
    }
}

fn secs_to_duration(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
