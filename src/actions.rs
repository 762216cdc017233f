use chrono::{DateTime, Utc};

use crate::boss::model::{BossCategory, BossDefinition};
use crate::boss::roster::Roster;
use crate::error::ActionError;
use crate::store::{TimerStore, TimerUpdate};
use crate::timezone::{most_recent_occurrence, next_weekday_occurrence, parse_twelve_hour, parse_weekday};

/// Result of a successful timer write.
#[derive(Debug, Clone)]
pub struct ActionReceipt {
    pub boss: BossDefinition,
    pub respawn_at: DateTime<Utc>,
}

/// Marks a guild boss defeated, either now or at a manually entered GMT+8
/// wall time resolved to its most recent occurrence.
pub fn mark_defeated(
    roster: &Roster,
    store: &mut dyn TimerStore,
    boss_id: &str,
    entered_time: Option<&str>,
    now: DateTime<Utc>,
) -> Result<ActionReceipt, ActionError> {
    let boss = lookup(roster, boss_id)?;
    if boss.category == BossCategory::Server {
        return Err(ActionError::WrongKind {
            id: boss.id.clone(),
            reason: "is a server boss; set its respawn time instead",
        });
    }
    let defeated_at = match entered_time {
        Some(entry) => most_recent_occurrence(parse_twelve_hour(entry)?, now)?,
        None => now,
    };

    if let Err(err) = store.set(&boss.id, TimerUpdate::defeated(defeated_at)) {
        tracing::warn!(boss = %boss.id, error = %err, "failed to record defeat");
        return Err(err.into());
    }
    tracing::info!(boss = %boss.id, %defeated_at, "boss marked defeated");
    Ok(ActionReceipt {
        respawn_at: defeated_at + boss.respawn_duration(),
        boss: boss.clone(),
    })
}

/// Sets an explicit respawn for a server boss at the next occurrence of the
/// given weekday and GMT+8 time.
pub fn schedule_respawn(
    roster: &Roster,
    store: &mut dyn TimerStore,
    boss_id: &str,
    weekday: &str,
    entered_time: &str,
    now: DateTime<Utc>,
) -> Result<ActionReceipt, ActionError> {
    let boss = lookup(roster, boss_id)?;
    if boss.category != BossCategory::Server {
        return Err(ActionError::WrongKind {
            id: boss.id.clone(),
            reason: "is not a server boss; mark it defeated instead",
        });
    }
    let time = parse_twelve_hour(entered_time)?;
    let weekday = parse_weekday(weekday)?;
    let respawn_at = next_weekday_occurrence(weekday, time, now)?;

    if let Err(err) = store.set(&boss.id, TimerUpdate::scheduled(respawn_at)) {
        tracing::warn!(boss = %boss.id, error = %err, "failed to record scheduled respawn");
        return Err(err.into());
    }
    tracing::info!(boss = %boss.id, %respawn_at, "server boss respawn scheduled");
    Ok(ActionReceipt {
        boss: boss.clone(),
        respawn_at,
    })
}

fn lookup<'a>(roster: &'a Roster, boss_id: &str) -> Result<&'a BossDefinition, ActionError> {
    roster
        .get(boss_id)
        .ok_or_else(|| ActionError::UnknownBoss(boss_id.to_string()))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::error::EntryError;
    use crate::store::MemoryStore;

    fn now() -> DateTime<Utc> {
        // Tuesday 2026-03-10 14:00 GMT+8
        Utc.with_ymd_and_hms(2026, 3, 10, 6, 0, 0)
            .single()
            .expect("valid")
    }

    #[test]
    fn mark_defeated_now_sets_respawn_from_duration() {
        let roster = Roster::builtin();
        let mut store = MemoryStore::new();
        let receipt =
            mark_defeated(&roster, &mut store, "inter-4-volva", None, now()).expect("defeat");
        assert_eq!(receipt.respawn_at, now() + Duration::hours(8));
        assert_eq!(
            store.get("inter-4-volva").and_then(|r| r.defeated_at),
            Some(now())
        );
    }

    #[test]
    fn mark_defeated_with_entered_time_uses_most_recent_occurrence() {
        let roster = Roster::builtin();
        let mut store = MemoryStore::new();
        let receipt = mark_defeated(&roster, &mut store, "normal-1-warlord", Some("1:00 PM"), now())
            .expect("defeat");
        assert_eq!(receipt.respawn_at, now() + Duration::hours(1));
    }

    #[test]
    fn invalid_entry_writes_nothing() {
        let roster = Roster::builtin();
        let mut store = MemoryStore::new();
        let err = mark_defeated(&roster, &mut store, "normal-1-warlord", Some("0:30 PM"), now())
            .expect_err("hour 0");
        assert!(matches!(err, ActionError::Entry(EntryError::HourOutOfRange(0))));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn boards_reject_the_other_kind_of_action() {
        let roster = Roster::builtin();
        let mut store = MemoryStore::new();
        assert!(matches!(
            mark_defeated(&roster, &mut store, "server-vale", None, now()),
            Err(ActionError::WrongKind { .. })
        ));
        assert!(matches!(
            schedule_respawn(&roster, &mut store, "normal-1-skald", "Mon", "9:00 PM", now()),
            Err(ActionError::WrongKind { .. })
        ));
        assert!(matches!(
            mark_defeated(&roster, &mut store, "nobody", None, now()),
            Err(ActionError::UnknownBoss(_))
        ));
    }

    #[test]
    fn schedule_respawn_targets_next_weekday() {
        let roster = Roster::builtin();
        let mut store = MemoryStore::new();
        let receipt = schedule_respawn(&roster, &mut store, "server-vale", "Thursday", "8:00 PM", now())
            .expect("schedule");
        assert_eq!(
            receipt.respawn_at,
            Utc.with_ymd_and_hms(2026, 3, 12, 12, 0, 0)
                .single()
                .expect("valid")
        );
        assert_eq!(
            store.get("server-vale").and_then(|r| r.scheduled_respawn_at),
            Some(receipt.respawn_at)
        );
        assert!(matches!(
            schedule_respawn(&roster, &mut store, "server-vale", "", "8:00 PM", now()),
            Err(ActionError::Entry(EntryError::MissingWeekday))
        ));
    }
}
