use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::board::BoardView;
use crate::boss::model::Board;
use crate::boss::roster::Roster;
use crate::config::{PushSettings, WatchConfig};
use crate::notify::scheduler::AlertScheduler;
use crate::notify::watcher::{GlobalWatcher, PollOutcome, Thresholds};
use crate::notify::{NotificationSurface, PermissionState, PushRegistrar};
use crate::store::{SharedStore, lock_store};
use crate::time_provider::TimeSource;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default)]
pub struct StepOutcome {
    pub retargeted: usize,
    pub view_alerts: usize,
    pub watcher: Option<PollOutcome>,
}

/// Single-threaded driver for the board view, its alerts and the global
/// watcher. All deferred work fires from `step`.
pub struct Runtime<S: NotificationSurface> {
    roster: Roster,
    store: SharedStore,
    surface: S,
    view: BoardView,
    watcher: Option<GlobalWatcher>,
    thresholds: Thresholds,
    poll_interval_secs: u64,
    icon: String,
    advisory_logged: bool,
}

impl<S: NotificationSurface> Runtime<S> {
    pub fn new(
        roster: Roster,
        store: SharedStore,
        surface: S,
        config: &WatchConfig,
        board: Option<Board>,
    ) -> Self {
        let thresholds = config.thresholds();
        Self {
            roster,
            store,
            surface,
            view: BoardView::mount(board, thresholds, None),
            watcher: None,
            thresholds,
            poll_interval_secs: config.poll_interval_secs,
            icon: config.notification_icon.clone(),
            advisory_logged: false,
        }
    }

    /// Starts the notification session when the surface grants permission.
    /// Without permission the runtime keeps showing countdowns only.
    pub fn enable_notifications(
        &mut self,
        registrar: &mut dyn PushRegistrar,
        push: Option<&PushSettings>,
    ) -> PermissionState {
        let mut permission = self.surface.permission_state();
        if permission == PermissionState::Default {
            permission = self.surface.request_permission();
        }
        if !permission.allows_alerts() {
            if !self.advisory_logged
                && let Some(advisory) = permission.advisory()
            {
                tracing::warn!(?permission, "{advisory}");
                self.advisory_logged = true;
            }
            return permission;
        }

        if self.watcher.is_none() {
            self.view
                .attach_alerts(AlertScheduler::new(permission, &self.icon));
            self.watcher = Some(GlobalWatcher::new(
                self.thresholds,
                self.poll_interval_secs,
                &self.icon,
            ));
            tracing::info!("notification session started");
        }
        if let Some(push) = push
            && let Err(err) = registrar.register(&push.user, &push.token)
        {
            tracing::warn!(error = %err, "push registration failed");
        }
        permission
    }

    #[cfg(test)]
    pub fn notifications_enabled(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn step(&mut self, now: DateTime<Utc>) -> Result<StepOutcome> {
        let mut outcome = StepOutcome::default();
        let mut store = lock_store(&self.store)?;
        if let Err(err) = store.refresh() {
            tracing::warn!(error = %err, "timer store refresh failed, keeping last known timers");
        }
        outcome.retargeted = self.view.sync(&self.roster, &*store, now);
        outcome.view_alerts = self.view.tick(now, &mut self.surface);
        if let Some(watcher) = self.watcher.as_mut() {
            outcome.watcher =
                watcher.poll_if_due(&self.roster, || store.all(), now, &mut self.surface);
        }
        Ok(outcome)
    }

    /// Ticks once per second until `run_for` elapses, or forever.
    pub fn run(&mut self, time: &dyn TimeSource, run_for: Option<Duration>) -> Result<()> {
        let started = Instant::now();
        let mut next_tick = started;
        loop {
            let outcome = self.step(time.now())?;
            if outcome.retargeted > 0 || outcome.view_alerts > 0 {
                tracing::debug!(
                    retargeted = outcome.retargeted,
                    alerts = outcome.view_alerts,
                    "board view updated"
                );
            }
            if let Some(poll) = outcome.watcher {
                tracing::trace!(
                    observed = poll.observed,
                    notified = poll.notified,
                    rearmed = poll.rearmed,
                    "watcher polled"
                );
            }
            if run_for.is_some_and(|limit| started.elapsed() >= limit) {
                break;
            }
            next_tick += TICK_INTERVAL;
            if next_tick <= Instant::now() {
                next_tick = Instant::now() + TICK_INTERVAL;
            }
            sleep_until(next_tick);
        }
        self.view.teardown();
        if self.watcher.take().is_some() {
            tracing::info!("notification session ended");
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn view(&self) -> &BoardView {
        &self.view
    }

    #[cfg(test)]
    pub fn surface(&self) -> &S {
        &self.surface
    }
}

pub fn sleep_until(deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if !remaining.is_zero() {
        std::thread::sleep(remaining);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;
    use crate::clock::compute_countdown;
    use crate::notify::{LogPushRegistrar, RecordingSurface};
    use crate::store::{MemoryStore, TimerStore, TimerUpdate};
    use crate::time_provider::FixedTimeSource;

    const KEY: &str = "normal-1-warlord";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 4, 0, 0)
            .single()
            .expect("valid")
    }

    fn runtime(store: SharedStore, surface: RecordingSurface) -> Runtime<RecordingSurface> {
        Runtime::new(
            Roster::builtin(),
            store,
            surface,
            &WatchConfig::default(),
            Some(Board::Guild),
        )
    }

    #[test]
    fn two_hour_boss_alerts_before_respawn_and_reports_up_after() {
        let n = start();
        let mut memory = MemoryStore::new();
        memory.set(KEY, TimerUpdate::defeated(n)).expect("set");
        let store: SharedStore = Arc::new(Mutex::new(memory));
        let mut rt = runtime(Arc::clone(&store), RecordingSurface::granted());
        assert_eq!(
            rt.enable_notifications(&mut LogPushRegistrar, None),
            PermissionState::Granted
        );

        rt.step(n).expect("step");
        assert_eq!(rt.view().pending_alerts(), 1);
        assert!(rt.surface().raised.is_empty());

        let alert_time = n + ChronoDuration::hours(1) + ChronoDuration::minutes(57);
        let outcome = rt.step(alert_time).expect("step");
        assert_eq!(outcome.view_alerts, 1);
        assert_eq!(rt.view().pending_alerts(), 0);
        // View and watcher both raise; the surface collapses them by tag.
        assert!(rt.surface().tags().iter().all(|tag| *tag == KEY));
        assert!(!rt.surface().raised.is_empty());

        let raised = rt.surface().raised.len();
        rt.step(alert_time + ChronoDuration::seconds(60)).expect("step");
        assert_eq!(rt.surface().raised.len(), raised);

        let after = n + ChronoDuration::hours(2) + ChronoDuration::seconds(1);
        rt.step(after).expect("step");
        let respawn = n + ChronoDuration::hours(2);
        assert!(compute_countdown(Some(respawn), after).is_up);
        assert!(rt.view().snapshot(KEY).expect("ticker").is_up);
    }

    #[test]
    fn denied_permission_keeps_countdowns_without_alerts() {
        let n = start();
        let mut memory = MemoryStore::new();
        memory.set(KEY, TimerUpdate::defeated(n)).expect("set");
        let store: SharedStore = Arc::new(Mutex::new(memory));
        let surface = RecordingSurface {
            permission: PermissionState::Denied,
            raised: Vec::new(),
        };
        let mut rt = runtime(store, surface);
        assert_eq!(
            rt.enable_notifications(&mut LogPushRegistrar, None),
            PermissionState::Denied
        );
        assert!(!rt.notifications_enabled());

        rt.step(n).expect("step");
        rt.step(n + ChronoDuration::minutes(118)).expect("step");
        assert!(rt.surface().raised.is_empty());
        assert_eq!(rt.view().pending_alerts(), 0);
        assert_eq!(
            rt.view().snapshot(KEY).map(|s| s.total_seconds_remaining),
            Some(120)
        );
    }

    #[test]
    fn watcher_alerts_for_bosses_defeated_mid_session() {
        let n = start();
        let store: SharedStore = Arc::new(Mutex::new(MemoryStore::new()));
        let mut rt = runtime(Arc::clone(&store), RecordingSurface::granted());
        rt.enable_notifications(&mut LogPushRegistrar, None);
        rt.step(n).expect("step");

        lock_store(&store)
            .expect("lock")
            .set("server-vale", TimerUpdate::scheduled(n + ChronoDuration::minutes(20)))
            .expect("set");
        // Guild view does not show server bosses; only the watcher sees it.
        rt.step(n + ChronoDuration::minutes(5)).expect("step");
        assert_eq!(rt.view().pending_alerts(), 0);
        assert_eq!(rt.surface().tags(), vec!["server-vale"]);
    }

    #[test]
    fn run_for_zero_steps_once_and_tears_down() {
        let n = start();
        let mut memory = MemoryStore::new();
        memory.set(KEY, TimerUpdate::defeated(n)).expect("set");
        let store: SharedStore = Arc::new(Mutex::new(memory));
        let mut rt = runtime(store, RecordingSurface::granted());
        rt.enable_notifications(&mut LogPushRegistrar, None);
        rt.run(&FixedTimeSource(n), Some(Duration::ZERO)).expect("run");
        assert_eq!(rt.view().pending_alerts(), 0);
        assert!(!rt.notifications_enabled());
    }
}
