use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::boss::model::{Board, BossCategory};
use crate::boss::roster::Roster;
use crate::clock::{CountdownSnapshot, CountdownTicker, compute_countdown};
use crate::notify::NotificationSurface;
use crate::notify::scheduler::AlertScheduler;
use crate::notify::watcher::Thresholds;
use crate::store::TimerStore;
use crate::timezone::format_respawn_display;

#[derive(Debug, Clone, Serialize)]
pub struct BoardRow {
    pub boss_id: String,
    pub label: String,
    pub category: BossCategory,
    pub countdown: CountdownSnapshot,
    pub display: String,
    pub respawn_at: Option<DateTime<Utc>>,
    pub respawn_display: Option<String>,
    pub close_to_respawn: bool,
}

pub fn build_rows(
    roster: &Roster,
    board: Option<Board>,
    store: &dyn TimerStore,
    now: DateTime<Utc>,
    close_window_secs: i64,
) -> Vec<BoardRow> {
    roster
        .on_board(board)
        .map(|boss| {
            let respawn_at = boss.respawn_instant(store.get(&boss.id).as_ref());
            let countdown = compute_countdown(respawn_at, now);
            BoardRow {
                boss_id: boss.id.clone(),
                label: boss.display_identity(),
                category: boss.category,
                display: if countdown.is_up {
                    "RESPAWNED".to_string()
                } else {
                    countdown.render()
                },
                respawn_at: respawn_at.filter(|_| !countdown.is_up),
                respawn_display: respawn_at
                    .filter(|_| !countdown.is_up)
                    .map(format_respawn_display),
                close_to_respawn: countdown.is_close_to_respawn(close_window_secs),
                countdown,
            }
        })
        .collect()
}

pub fn render_table(rows: &[BoardRow]) -> String {
    let width = rows.iter().map(|row| row.label.len()).max().unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        let marker = if row.close_to_respawn { " *" } else { "" };
        let _ = write!(out, "{:<width$}  {:>12}", row.label, row.display);
        if let Some(display) = &row.respawn_display {
            let _ = write!(out, "  {display}");
        }
        let _ = writeln!(out, "{marker}");
    }
    out
}

/// A mounted board: one countdown ticker per boss plus this view's own alert
/// registry. Tearing the view down cancels both.
pub struct BoardView {
    board: Option<Board>,
    thresholds: Thresholds,
    tickers: HashMap<String, CountdownTicker>,
    alerts: Option<AlertScheduler>,
    seen_revision: Option<u64>,
}

impl BoardView {
    pub fn mount(board: Option<Board>, thresholds: Thresholds, alerts: Option<AlertScheduler>) -> Self {
        Self {
            board,
            thresholds,
            tickers: HashMap::new(),
            alerts,
            seen_revision: None,
        }
    }

    pub fn attach_alerts(&mut self, alerts: AlertScheduler) {
        self.alerts = Some(alerts);
        self.seen_revision = None;
    }

    /// Re-derives respawn instants when the store revision moved. Returns
    /// how many countdowns changed target.
    pub fn sync(&mut self, roster: &Roster, store: &dyn TimerStore, now: DateTime<Utc>) -> usize {
        let revision = store.revision();
        if self.seen_revision == Some(revision) {
            return 0;
        }
        self.seen_revision = Some(revision);

        let mut retargeted = 0;
        for boss in roster.on_board(self.board) {
            let respawn_at = boss.respawn_instant(store.get(&boss.id).as_ref());
            let ticker = self
                .tickers
                .entry(boss.id.clone())
                .or_insert_with(|| CountdownTicker::new(None, now));
            if ticker.retarget(respawn_at, now) {
                retargeted += 1;
            }
            let is_up = ticker.snapshot().is_up;

            let Some(alerts) = self.alerts.as_mut() else {
                continue;
            };
            match respawn_at {
                Some(respawn_at) if !is_up => {
                    alerts.schedule_alert(
                        &boss.id,
                        &boss.display_identity(),
                        respawn_at,
                        self.thresholds.for_category(boss.category),
                        now,
                    );
                }
                _ => {
                    alerts.cancel(&boss.id);
                }
            }
        }
        retargeted
    }

    /// Advances tickers and fires due alerts. Returns the number of alerts fired.
    pub fn tick(&mut self, now: DateTime<Utc>, surface: &mut dyn NotificationSurface) -> usize {
        for ticker in self.tickers.values_mut() {
            let _ = ticker.poll(now);
        }
        self.alerts
            .as_mut()
            .map_or(0, |alerts| alerts.fire_due(now, surface))
    }

    #[cfg(test)]
    pub fn snapshot(&self, boss_id: &str) -> Option<CountdownSnapshot> {
        self.tickers.get(boss_id).map(CountdownTicker::snapshot)
    }

    #[cfg(test)]
    pub fn ticking(&self) -> usize {
        self.tickers.values().filter(|ticker| ticker.is_ticking()).count()
    }

    #[cfg(test)]
    pub fn pending_alerts(&self) -> usize {
        self.alerts.as_ref().map_or(0, AlertScheduler::len)
    }

    #[cfg(test)]
    pub fn alerts(&self) -> Option<&AlertScheduler> {
        self.alerts.as_ref()
    }

    pub fn teardown(&mut self) -> usize {
        for ticker in self.tickers.values_mut() {
            ticker.cancel();
        }
        let cancelled = self.alerts.as_mut().map_or(0, AlertScheduler::cancel_all);
        if cancelled > 0 {
            tracing::debug!(cancelled, "board view torn down, pending alerts cancelled");
        }
        cancelled
    }
}

impl Drop for BoardView {
    fn drop(&mut self) {
        self.teardown();
    }
}
