//! Human-readable ages for timestamps.

use chrono::{DateTime, Utc};

/// Describe how long ago `then` was, relative to `now`.
#[must_use]
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(then);

    if age.num_days() > 0 {
        plural(age.num_days(), "day")
    } else if age.num_hours() > 0 {
        plural(age.num_hours(), "hour")
    } else if age.num_minutes() > 0 {
        plural(age.num_minutes(), "minute")
    } else {
        "just now".to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{n} {unit}{} ago", if n == 1 { "" } else { "s" })
}
