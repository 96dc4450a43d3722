//! Event calendar: which calendar day a scan falls on.
//!
//! "Today" is always computed in the event's own time zone. The zone is
//! configuration handed to the engine, never the host's local time.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;

/// Time zone and (optional) fixed set of days of the event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventCalendar {
    timezone: Tz,
    event_days: BTreeSet<NaiveDate>,
}

impl EventCalendar {
    /// Calendar for an event held in `timezone` with no fixed day list.
    #[must_use]
    pub const fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            event_days: BTreeSet::new(),
        }
    }

    /// Restrict registrations to the given event days.
    #[must_use]
    pub fn with_event_days(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.event_days = days.into_iter().collect();
        self
    }

    /// The event's time zone.
    #[must_use]
    pub const fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The configured event days (empty when unrestricted).
    #[must_use]
    pub const fn event_days(&self) -> &BTreeSet<NaiveDate> {
        &self.event_days
    }

    /// Calendar date of `now` in the event's time zone.
    #[must_use]
    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    /// Whether `day` may be selected at registration.
    #[must_use]
    pub fn is_event_day(&self, day: NaiveDate) -> bool {
        self.event_days.is_empty() || self.event_days.contains(&day)
    }
}

impl Default for EventCalendar {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_today_uses_event_timezone() {
        // 20:30 UTC on Dec 1 is already Dec 2 in Kolkata (+05:30)
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 20, 30, 0).unwrap();
        let kolkata = EventCalendar::new(chrono_tz::Asia::Kolkata);
        let utc = EventCalendar::default();

        assert_eq!(kolkata.today(now), NaiveDate::from_ymd_opt(2025, 12, 2).unwrap());
        assert_eq!(utc.today(now), NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
    }

    #[test]
    fn test_event_days_restrict_selection() {
        let d1 = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 12, 2).unwrap();
        let open = EventCalendar::default();
        let fixed = EventCalendar::default().with_event_days([d1]);

        assert!(open.is_event_day(d2));
        assert!(fixed.is_event_day(d1));
        assert!(!fixed.is_event_day(d2));
    }
}
