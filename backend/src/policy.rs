//! Group time-window policies.
//!
//! A policy restricts VPN access to a set of ISO weekdays and, optionally, a
//! time-of-day window evaluated in the policy's own timezone. A window whose
//! start is after its end wraps midnight (e.g. 22:00 - 06:00).

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Zone used when a policy names a timezone that does not exist.
pub const FALLBACK_TIMEZONE: Tz = chrono_tz::Asia::Seoul;

/// Weekdays allowed by a freshly created policy (Monday to Friday).
pub const DEFAULT_WEEKDAYS: &str = "1,2,3,4,5";

/// Access policy attached to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeWindowPolicy {
    /// Declared but not consulted: every user needs 2FA.
    pub require_two_factor: bool,
    /// Declared but not consulted.
    pub allow_without_two_factor: bool,
    /// Hours a new user may connect before enrollment is enforced. Reserved.
    pub grace_period_hours: i32,
    pub time_restriction_enabled: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    /// ISO weekdays, 1 = Monday .. 7 = Sunday.
    pub allowed_weekdays: BTreeSet<u8>,
    /// IANA zone name, e.g. "Asia/Seoul".
    pub timezone: String,
}

impl Default for TimeWindowPolicy {
    fn default() -> Self {
        Self {
            require_two_factor: true,
            allow_without_two_factor: false,
            grace_period_hours: 24,
            time_restriction_enabled: false,
            start_time: None,
            end_time: None,
            allowed_weekdays: parse_weekdays(DEFAULT_WEEKDAYS),
            timezone: FALLBACK_TIMEZONE.name().to_string(),
        }
    }
}

/// Result of evaluating a policy at an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessWindow {
    pub allowed: bool,
    pub reason: String,
}

impl AccessWindow {
    fn allowed(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

impl TimeWindowPolicy {
    /// Evaluate the policy at `now`, falling back to [`FALLBACK_TIMEZONE`].
    pub fn is_access_allowed_at(&self, now: DateTime<Utc>) -> AccessWindow {
        self.is_access_allowed_in(now, FALLBACK_TIMEZONE)
    }

    /// Evaluate the policy at `now`. An unknown timezone name resolves to
    /// `fallback` instead of failing the check.
    pub fn is_access_allowed_in(&self, now: DateTime<Utc>, fallback: Tz) -> AccessWindow {
        if !self.time_restriction_enabled {
            return AccessWindow::allowed("no time restriction");
        }

        let local = now.with_timezone(&self.resolve_timezone(fallback));
        let weekday = local.weekday().number_from_monday() as u8;
        let current = local.time();

        if !self.allowed_weekdays.contains(&weekday) {
            return AccessWindow::denied(format!(
                "weekday not allowed (today: {})",
                weekday_name(weekday)
            ));
        }

        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            let inside = if start <= end {
                start <= current && current <= end
            } else {
                current >= start || current <= end
            };
            if !inside {
                return AccessWindow::denied(format!(
                    "outside allowed hours (allowed: {} - {})",
                    start.format("%H:%M"),
                    end.format("%H:%M")
                ));
            }
        }

        AccessWindow::allowed(format!(
            "access allowed (now: {:02}:{:02})",
            current.hour(),
            current.minute()
        ))
    }

    /// Configured zone, or `fallback` when the name is not a known IANA zone.
    pub fn resolve_timezone(&self, fallback: Tz) -> Tz {
        match self.timezone.parse::<Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                tracing::warn!(
                    timezone = %self.timezone,
                    fallback = %fallback.name(),
                    "Unknown policy timezone, using fallback"
                );
                fallback
            }
        }
    }

    /// Allowed weekdays as a comma-separated list of day names.
    pub fn weekdays_display(&self) -> String {
        self.allowed_weekdays
            .iter()
            .map(|d| weekday_name(*d))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Allowed weekdays in their persisted form ("1,2,3").
    pub fn weekdays_to_string(&self) -> String {
        self.allowed_weekdays
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Parse a persisted weekday list. Entries that are not numbers in 1..=7 are
/// ignored, so a garbled list degrades to fewer allowed days.
pub fn parse_weekdays(raw: &str) -> BTreeSet<u8> {
    raw.split(',')
        .filter_map(|d| d.trim().parse::<u8>().ok())
        .filter(|d| (1..=7).contains(d))
        .collect()
}

fn weekday_name(day: u8) -> &'static str {
    match day {
        1 => "Monday",
        2 => "Tuesday",
        3 => "Wednesday",
        4 => "Thursday",
        5 => "Friday",
        6 => "Saturday",
        7 => "Sunday",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// 2024-01-01 is a Monday. Builds the UTC instant for a Seoul wall clock time.
    fn seoul(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        chrono_tz::Asia::Seoul
            .with_ymd_and_hms(2024, 1, day, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn restricted(start: Option<NaiveTime>, end: Option<NaiveTime>, days: &str) -> TimeWindowPolicy {
        TimeWindowPolicy {
            time_restriction_enabled: true,
            start_time: start,
            end_time: end,
            allowed_weekdays: parse_weekdays(days),
            timezone: "Asia/Seoul".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_restriction_always_allowed() {
        let policy = TimeWindowPolicy {
            allowed_weekdays: BTreeSet::new(),
            start_time: Some(time(9, 0)),
            end_time: Some(time(10, 0)),
            ..Default::default()
        };
        for day in 1..=7 {
            for hour in [0, 3, 12, 23] {
                let window = policy.is_access_allowed_at(seoul(day, hour, 30));
                assert!(window.allowed);
                assert_eq!(window.reason, "no time restriction");
            }
        }
    }

    #[test]
    fn test_day_window_boundaries() {
        let policy = restricted(Some(time(9, 0)), Some(time(18, 0)), "1");
        assert!(!policy.is_access_allowed_at(seoul(1, 8, 59)).allowed);
        assert!(policy.is_access_allowed_at(seoul(1, 9, 0)).allowed);
        assert!(policy.is_access_allowed_at(seoul(1, 18, 0)).allowed);
        assert!(!policy.is_access_allowed_at(seoul(1, 18, 1)).allowed);
    }

    #[test]
    fn test_wrapping_window() {
        let policy = restricted(Some(time(22, 0)), Some(time(6, 0)), "1,2,3,4,5,6,7");
        assert!(policy.is_access_allowed_at(seoul(2, 23, 0)).allowed);
        assert!(policy.is_access_allowed_at(seoul(2, 5, 0)).allowed);
        assert!(!policy.is_access_allowed_at(seoul(2, 12, 0)).allowed);
    }

    #[test]
    fn test_denied_weekday_names_the_day() {
        let policy = restricted(None, None, DEFAULT_WEEKDAYS);
        // 2024-01-06 is a Saturday
        let window = policy.is_access_allowed_at(seoul(6, 12, 0));
        assert!(!window.allowed);
        assert!(window.reason.contains("Saturday"));
    }

    #[test]
    fn test_empty_weekdays_denies_everything() {
        let policy = restricted(None, None, "");
        for day in 1..=7 {
            assert!(!policy.is_access_allowed_at(seoul(day, 12, 0)).allowed);
        }
    }

    #[test]
    fn test_missing_end_time_checks_day_only() {
        let policy = restricted(Some(time(9, 0)), None, "1");
        assert!(policy.is_access_allowed_at(seoul(1, 3, 0)).allowed);
        assert!(!policy.is_access_allowed_at(seoul(2, 3, 0)).allowed);
    }

    #[test]
    fn test_evaluates_in_policy_timezone() {
        let mut policy = restricted(Some(time(9, 0)), Some(time(18, 0)), "1,2,3,4,5,6,7");
        policy.timezone = "America/New_York".to_string();
        // 10:00 in Seoul is 20:00 the previous day in New York
        assert!(!policy.is_access_allowed_at(seoul(2, 10, 0)).allowed);
        // 23:00 in Seoul is 09:00 in New York
        assert!(policy.is_access_allowed_at(seoul(2, 23, 0)).allowed);
    }

    #[test]
    fn test_invalid_timezone_falls_back() {
        let mut policy = restricted(Some(time(9, 0)), Some(time(18, 0)), "1");
        policy.timezone = "Mars/Olympus_Mons".to_string();
        assert_eq!(policy.resolve_timezone(FALLBACK_TIMEZONE), FALLBACK_TIMEZONE);
        assert!(policy.is_access_allowed_at(seoul(1, 10, 0)).allowed);
        assert!(!policy.is_access_allowed_at(seoul(1, 19, 0)).allowed);
    }

    #[test]
    fn test_denied_hours_reason_names_window() {
        let policy = restricted(Some(time(9, 0)), Some(time(18, 0)), "1");
        let window = policy.is_access_allowed_at(seoul(1, 20, 0));
        assert_eq!(window.reason, "outside allowed hours (allowed: 09:00 - 18:00)");
    }

    #[test]
    fn test_parse_weekdays_ignores_garbage() {
        let days = parse_weekdays("1, 3,x,9,0,7,,");
        assert_eq!(days.into_iter().collect::<Vec<_>>(), vec![1, 3, 7]);
    }

    #[test]
    fn test_weekday_display_and_persisted_form() {
        let policy = TimeWindowPolicy {
            allowed_weekdays: parse_weekdays("7,1,3"),
            ..Default::default()
        };
        assert_eq!(policy.weekdays_display(), "Monday, Wednesday, Sunday");
        assert_eq!(policy.weekdays_to_string(), "1,3,7");
    }
}
