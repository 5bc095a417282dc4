use chrono::{DateTime, Duration, Months, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE_DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?P<number>[0-9]+)(?P<interval>[a-z])$")
        .expect("relative date pattern is valid")
});

// Guards against overflow in the date arithmetic below
const MAX_RELATIVE_NUMBER: u32 = 10_000;

/// Parses expressions like `-7d` or `3m` into a point in the past relative to `now`.
///
/// Supported intervals are hours, days, weeks, months and years. The leading minus
/// is optional and doesn't change the direction: every expression looks backwards.
pub fn parse_relative_date(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let captures = RELATIVE_DATE_REGEX.captures(value)?;
    let number = captures.name("number")?.as_str().parse::<u32>().ok()?;

    if number >= MAX_RELATIVE_NUMBER {
        return None;
    }

    match captures.name("interval")?.as_str() {
        "h" => now.checked_sub_signed(Duration::hours(i64::from(number))),
        "d" => now.checked_sub_signed(Duration::days(i64::from(number))),
        "w" => now.checked_sub_signed(Duration::weeks(i64::from(number))),
        "m" => now.checked_sub_months(Months::new(number)),
        "y" => now.checked_sub_months(Months::new(number * 12)),
        _ => None,
    }
}
