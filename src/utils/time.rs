use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;

pub const CIVIL_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Source of "now" as a civil (wall-clock) value in the configured zone.
/// Every eligibility and deadline comparison goes through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn zone(&self) -> Tz;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: Tz,
}

impl SystemClock {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.zone).naive_local()
    }

    fn zone(&self) -> Tz {
        self.zone
    }
}

/// A clock pinned to one civil instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: NaiveDateTime,
    zone: Tz,
}

impl FixedClock {
    pub fn new(at: NaiveDateTime, zone: Tz) -> Self {
        Self { at, zone }
    }

    /// Parses `YYYY-MM-DD HH:MM` as a civil instant.
    pub fn parse(civil: &str, zone: Tz) -> anyhow::Result<Self> {
        Ok(Self::new(parse_civil(civil)?, zone))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.at
    }

    fn zone(&self) -> Tz {
        self.zone
    }
}

pub fn parse_civil(s: &str) -> anyhow::Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s.trim(), CIVIL_FORMAT)?)
}

pub fn format_civil(at: NaiveDateTime) -> String {
    at.format(CIVIL_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_strings_round_trip() {
        let at = parse_civil("2024-03-10 17:00").unwrap();
        assert_eq!(format_civil(at), "2024-03-10 17:00");
        assert!(parse_civil("2024-03-10T17:00:00Z").is_err());
    }

    #[test]
    fn fixed_clock_reports_its_instant() {
        let clock = FixedClock::parse("2024-03-10 16:59", chrono_tz::UTC).unwrap();
        assert_eq!(format_civil(clock.now()), "2024-03-10 16:59");
        assert_eq!(clock.zone(), chrono_tz::UTC);
    }
}
