use chrono::{DateTime, Utc};
use serde::Serialize;

const SECONDS_PER_DAY: i64 = 86_400;
const SECONDS_PER_HOUR: i64 = 3_600;
const SECONDS_PER_MINUTE: i64 = 60;

/// Time left until a respawn, decomposed for display.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct CountdownSnapshot {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub total_seconds_remaining: i64,
    pub is_up: bool,
}

impl CountdownSnapshot {
    pub const UP: Self = Self {
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
        total_seconds_remaining: 0,
        is_up: true,
    };

    fn from_distance(distance: i64) -> Self {
        let days = distance.div_euclid(SECONDS_PER_DAY);
        let rest = distance.rem_euclid(SECONDS_PER_DAY);
        let hours = rest / SECONDS_PER_HOUR;
        let rest = rest % SECONDS_PER_HOUR;
        Self {
            days,
            hours,
            minutes: rest / SECONDS_PER_MINUTE,
            seconds: rest % SECONDS_PER_MINUTE,
            total_seconds_remaining: distance,
            is_up: false,
        }
    }

    #[cfg(test)]
    pub fn reconstituted_seconds(&self) -> i64 {
        self.days * SECONDS_PER_DAY
            + self.hours * SECONDS_PER_HOUR
            + self.minutes * SECONDS_PER_MINUTE
            + self.seconds
    }

    /// `HH:MM:SS`, prefixed with `Nd ` when at least a day remains.
    pub fn render(&self) -> String {
        let clock = format!(
            "{:02}:{:02}:{:02}",
            self.hours, self.minutes, self.seconds
        );
        if self.days > 0 {
            format!("{}d {clock}", self.days)
        } else {
            clock
        }
    }

    pub fn is_close_to_respawn(&self, window_secs: i64) -> bool {
        !self.is_up && self.total_seconds_remaining > 0 && self.total_seconds_remaining < window_secs
    }
}

pub fn compute_countdown(target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> CountdownSnapshot {
    let Some(target) = target else {
        return CountdownSnapshot::UP;
    };
    if target <= now {
        return CountdownSnapshot::UP;
    }
    // Positive durations truncate toward zero, which is the floor.
    CountdownSnapshot::from_distance((target - now).num_seconds())
}

/// One-second display tick for a single countdown.
#[derive(Debug, Clone)]
pub struct CountdownTicker {
    target: Option<DateTime<Utc>>,
    snapshot: CountdownSnapshot,
    next_tick: Option<DateTime<Utc>>,
}

impl CountdownTicker {
    pub fn new(target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let mut ticker = Self {
            target,
            snapshot: CountdownSnapshot::UP,
            next_tick: None,
        };
        ticker.restart(now);
        ticker
    }

    /// Returns true when the target actually changed.
    pub fn retarget(&mut self, target: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        if self.target == target {
            return false;
        }
        self.target = target;
        self.restart(now);
        true
    }

    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<CountdownSnapshot> {
        let due = self.next_tick?;
        if now < due {
            return None;
        }
        self.snapshot = compute_countdown(self.target, now);
        self.next_tick = if self.snapshot.is_up {
            None
        } else if now - due >= chrono::Duration::seconds(1) {
            Some(now + chrono::Duration::seconds(1))
        } else {
            Some(due + chrono::Duration::seconds(1))
        };
        Some(self.snapshot)
    }

    pub fn cancel(&mut self) {
        self.next_tick = None;
    }

    #[cfg(test)]
    pub fn is_ticking(&self) -> bool {
        self.next_tick.is_some()
    }

    #[cfg(test)]
    pub fn next_tick(&self) -> Option<DateTime<Utc>> {
        self.next_tick
    }

    pub fn snapshot(&self) -> CountdownSnapshot {
        self.snapshot
    }

    fn restart(&mut self, now: DateTime<Utc>) {
        self.snapshot = compute_countdown(self.target, now);
        self.next_tick = (!self.snapshot.is_up).then(|| now + chrono::Duration::seconds(1));
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn absent_or_past_target_is_up() {
        let now = base();
        assert_eq!(compute_countdown(None, now), CountdownSnapshot::UP);
        assert_eq!(compute_countdown(Some(now), now), CountdownSnapshot::UP);
        assert_eq!(
            compute_countdown(Some(now - Duration::seconds(5)), now),
            CountdownSnapshot::UP
        );
    }

    #[test]
    fn future_target_reports_floored_seconds() {
        let now = base();
        let target = now + Duration::milliseconds(90_500);
        let snapshot = compute_countdown(Some(target), now);
        assert!(!snapshot.is_up);
        assert_eq!(snapshot.total_seconds_remaining, 90);
        assert_eq!((snapshot.minutes, snapshot.seconds), (1, 30));
    }

    #[test]
    fn sub_second_remainder_is_not_up_yet() {
        let now = base();
        let snapshot = compute_countdown(Some(now + Duration::milliseconds(400)), now);
        assert!(!snapshot.is_up);
        assert_eq!(snapshot.total_seconds_remaining, 0);
    }

    #[test]
    fn decomposition_reconstitutes_exactly() {
        let now = base();
        for distance in [0, 1, 59, 60, 3_599, 3_600, 86_399, 86_400, 86_401, 999_999] {
            let snapshot = compute_countdown(Some(now + Duration::seconds(distance)), now);
            if distance == 0 {
                assert!(snapshot.is_up);
            }
            assert_eq!(snapshot.reconstituted_seconds(), distance, "distance {distance}");
            assert!(snapshot.hours < 24 && snapshot.minutes < 60 && snapshot.seconds < 60);
        }
    }

    #[test]
    fn render_pads_clock_and_omits_zero_days() {
        let now = base();
        let short = compute_countdown(Some(now + Duration::seconds(3_723)), now);
        assert_eq!(short.render(), "01:02:03");
        let long = compute_countdown(Some(now + Duration::seconds(86_400 + 3_723)), now);
        assert_eq!(long.render(), "1d 01:02:03");
    }

    #[test]
    fn close_to_respawn_window_excludes_up() {
        let now = base();
        assert!(compute_countdown(Some(now + Duration::seconds(299)), now).is_close_to_respawn(300));
        assert!(!compute_countdown(Some(now + Duration::seconds(300)), now).is_close_to_respawn(300));
        assert!(!CountdownSnapshot::UP.is_close_to_respawn(300));
    }

    #[test]
    fn ticker_counts_down_monotonically_and_stops_when_up() {
        let now = base();
        let mut ticker = CountdownTicker::new(Some(now + Duration::seconds(3)), now);
        assert!(ticker.is_ticking());
        assert_eq!(ticker.poll(now + Duration::milliseconds(500)), None);

        let mut last = ticker.snapshot().total_seconds_remaining;
        for step in 1..=3 {
            let snapshot = ticker
                .poll(now + Duration::seconds(step))
                .expect("tick due");
            assert!(snapshot.total_seconds_remaining <= last);
            last = snapshot.total_seconds_remaining;
        }
        assert!(ticker.snapshot().is_up);
        assert!(!ticker.is_ticking());
        assert_eq!(ticker.poll(now + Duration::seconds(10)), None);
    }

    #[test]
    fn ticker_restarts_immediately_on_new_future_target() {
        let now = base();
        let mut ticker = CountdownTicker::new(None, now);
        assert!(!ticker.is_ticking());

        let later = now + Duration::seconds(5);
        assert!(ticker.retarget(Some(now + Duration::hours(2)), later));
        assert!(ticker.is_ticking());
        assert_eq!(ticker.snapshot().total_seconds_remaining, 7_195);
        assert_eq!(ticker.next_tick(), Some(later + Duration::seconds(1)));
        assert!(!ticker.retarget(Some(now + Duration::hours(2)), later));
    }

    #[test]
    fn ticker_catches_up_after_suspension() {
        let now = base();
        let mut ticker = CountdownTicker::new(Some(now + Duration::hours(1)), now);
        let resumed = now + Duration::seconds(120);
        let snapshot = ticker.poll(resumed).expect("late tick still fires");
        assert_eq!(snapshot.total_seconds_remaining, 3_480);
        assert_eq!(ticker.next_tick(), Some(resumed + Duration::seconds(1)));
    }

    #[test]
    fn cancelled_ticker_never_fires() {
        let now = base();
        let mut ticker = CountdownTicker::new(Some(now + Duration::hours(1)), now);
        ticker.cancel();
        assert_eq!(ticker.poll(now + Duration::seconds(2)), None);
    }
}
