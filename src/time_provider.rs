use chrono::{DateTime, Utc};

/// Wall-clock source. Everything downstream compares plain UTC instants.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn label(&self) -> &'static str;
}

pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn label(&self) -> &'static str {
        "SYSTEM_UTC"
    }
}

/// Clock pinned to a caller-supplied instant.
#[cfg(test)]
pub struct FixedTimeSource(pub DateTime<Utc>);

#[cfg(test)]
impl TimeSource for FixedTimeSource {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }

    fn label(&self) -> &'static str {
        "FIXED"
    }
}
