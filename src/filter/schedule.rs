//! Schedule window evaluation.
//!
//! A rule matches when today's weekday is listed and the current "HH:MM"
//! falls inside [start, end]. Times compare lexicographically, which
//! matches time order because config validation enforces zero-padded
//! 24-hour strings. Only strict rules block on their own; non-strict
//! windows leave the decision to the blocklists.

use chrono::{Datelike, Local, Weekday};

use crate::config::ScheduleRule;

/// True when the current instant falls inside a matching strict rule.
pub fn restricted_strict_now(rules: &[ScheduleRule]) -> bool {
    let now = Local::now();
    restricted_strict(rules, now.weekday(), &now.format("%H:%M").to_string())
}

pub fn restricted_strict(rules: &[ScheduleRule], weekday: Weekday, time_hhmm: &str) -> bool {
    let day = weekday_name(weekday);
    rules.iter().any(|rule| {
        rule.strict_mode
            && rule.days.iter().any(|d| d.eq_ignore_ascii_case(day))
            && rule.start_time.as_str() <= time_hhmm
            && time_hhmm <= rule.end_time.as_str()
    })
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}
