//! UTC cron evaluator (5-field: min hour dom month dow).
//!
//! Evaluation is UTC-only and DST-agnostic by contract.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Parse a cron field and check if a value matches.
fn cron_field_matches(field: &str, value: u32) -> bool {
    if field == "*" {
        return true;
    }
    // Handle */N (every N)
    if let Some(step) = field.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u32>() {
            return n > 0 && value % n == 0;
        }
    }
    // Handle comma-separated values
    for part in field.split(',') {
        // Handle range N-M
        if let Some((start_s, end_s)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start_s.parse::<u32>(), end_s.parse::<u32>()) {
                if value >= start && value <= end {
                    return true;
                }
            }
        } else if let Ok(n) = part.parse::<u32>() {
            if value == n {
                return true;
            }
        }
    }
    false
}

/// Check that an expression has exactly five fields.
pub fn is_valid(cron: &str) -> bool {
    cron.split_whitespace().count() == 5
}

/// Check if a UTC datetime matches a 5-field cron expression.
pub fn cron_matches(cron: &str, dt: &DateTime<Utc>) -> bool {
    let fields: Vec<&str> = cron.split_whitespace().collect();
    if fields.len() != 5 {
        return false;
    }
    cron_field_matches(fields[0], dt.minute())
        && cron_field_matches(fields[1], dt.hour())
        && cron_field_matches(fields[2], dt.day())
        && cron_field_matches(fields[3], dt.month())
        && cron_field_matches(fields[4], dt.weekday().num_days_from_sunday())
}

/// Compute the next occurrence strictly after `after`. Scans minute by
/// minute, bounded at one year.
pub fn cron_next(cron: &str, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !is_valid(cron) {
        return None;
    }

    // Advance to the next whole minute.
    let seconds_into_minute = after.second() as i64;
    let mut candidate = *after + chrono::Duration::seconds(60 - seconds_into_minute);
    candidate = candidate.with_second(0).unwrap_or(candidate);
    candidate = candidate.with_nanosecond(0).unwrap_or(candidate);

    let max_checks = 366 * 24 * 60; // one year of minutes
    for _ in 0..max_checks {
        if cron_matches(cron, &candidate) {
            return Some(candidate);
        }
        candidate += chrono::Duration::minutes(1);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_every_5_minutes() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(cron_matches("*/5 * * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 3, 0).unwrap();
        assert!(!cron_matches("*/5 * * * *", &dt2));
    }

    #[test]
    fn cron_specific_time() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap();
        assert!(cron_matches("30 9 * * *", &dt));
        assert!(!cron_matches("30 10 * * *", &dt));
    }

    #[test]
    fn cron_range() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert!(cron_matches("0 9-17 * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 20, 0, 0).unwrap();
        assert!(!cron_matches("0 9-17 * * *", &dt2));
    }

    #[test]
    fn cron_comma_separated() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 10, 15, 0).unwrap();
        assert!(cron_matches("0,15,30,45 * * * *", &dt));
        let dt2 = Utc.with_ymd_and_hms(2024, 6, 15, 10, 20, 0).unwrap();
        assert!(!cron_matches("0,15,30,45 * * * *", &dt2));
    }

    #[test]
    fn cron_weekday() {
        // 2024-06-16 is a Sunday (num_days_from_sunday == 0).
        let sunday = Utc.with_ymd_and_hms(2024, 6, 16, 9, 0, 0).unwrap();
        assert!(cron_matches("0 9 * * 0", &sunday));
        assert!(!cron_matches("0 9 * * 1", &sunday));
    }

    #[test]
    fn cron_next_finds_occurrence() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        let next = cron_next("30 * * * *", &after).unwrap();
        assert_eq!(next.minute(), 30);
        assert_eq!(next.hour(), 10);
    }

    #[test]
    fn cron_next_is_strictly_after() {
        // `after` itself matches; next must be the following day.
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        let next = cron_next("0 9 * * *", &after).unwrap();
        assert_eq!(next.day(), 16);
        assert_eq!(next.hour(), 9);
    }

    #[test]
    fn cron_next_rejects_malformed() {
        let after = Utc::now();
        assert!(cron_next("* * *", &after).is_none());
        assert!(!is_valid("* * *"));
        assert!(is_valid("*/10 * * * *"));
    }

    #[test]
    fn cron_next_from_mid_minute_rounds_up() {
        let after = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 31).unwrap();
        let next = cron_next("* * * * *", &after).unwrap();
        assert_eq!(next.minute(), 1);
        assert_eq!(next.second(), 0);
    }
}
