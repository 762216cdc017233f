use std::fmt::Write as _;

use anyhow::Result;

use crate::boss::model::BossCategory;
use crate::boss::roster::Roster;
use crate::clock::compute_countdown;
use crate::config::WatchConfig;
use crate::store::TimerStore;
use crate::time_provider::TimeSource;
use crate::timezone::{DISPLAY_OFFSET_LABEL, format_respawn_display};

pub fn run_diagnostics(
    time: &dyn TimeSource,
    config: &WatchConfig,
    roster: &Roster,
    store: &dyn TimerStore,
) -> Result<()> {
    print!("{}", render_report(time, config, roster, store));
    Ok(())
}

pub fn render_report(
    time: &dyn TimeSource,
    config: &WatchConfig,
    roster: &Roster,
    store: &dyn TimerStore,
) -> String {
    let now = time.now();
    let records = store.all();
    let active = records
        .iter()
        .filter_map(|(id, record)| {
            let boss = roster.get(id)?;
            boss.respawn_instant(Some(record))
        })
        .filter(|respawn_at| !compute_countdown(Some(*respawn_at), now).is_up)
        .count();
    let server_count = roster
        .iter()
        .filter(|boss| boss.category == BossCategory::Server)
        .count();
    let thresholds = config.thresholds();

    let mut out = String::new();
    let _ = writeln!(out, "bosswatch diagnostics");
    let _ = writeln!(out, "Time source: {}", time.label());
    let _ = writeln!(out, "Current time: {}", format_respawn_display(now));
    let _ = writeln!(out, "Display zone: {DISPLAY_OFFSET_LABEL}");
    let _ = writeln!(out, "Config version: {}", config.version);
    let _ = writeln!(
        out,
        "Roster: {} bosses ({} guild, {server_count} server)",
        roster.len(),
        roster.len() - server_count
    );
    let _ = writeln!(out, "Timer store: {}", config.store_path.display());
    let _ = writeln!(out, "  Records: {}", records.len());
    let _ = writeln!(out, "  Active countdowns: {active}");
    let _ = writeln!(out, "Notification permission: {:?}", config.permission);
    if let Some(advisory) = config.permission.advisory() {
        let _ = writeln!(out, "  {advisory}");
    }
    let _ = writeln!(
        out,
        "Alert lead: {}s (guild), {}s (server)",
        thresholds.short.num_seconds(),
        thresholds.server.num_seconds()
    );
    let _ = writeln!(out, "Watcher poll interval: {}s", config.poll_interval_secs);
    let _ = writeln!(
        out,
        "Board password: {}",
        if config.board_password.is_some() {
            "set"
        } else {
            "not set"
        }
    );
    let _ = writeln!(
        out,
        "Push registration: {}",
        config
            .push
            .as_ref()
            .map_or("disabled", |_| "enabled")
    );
    out
}
