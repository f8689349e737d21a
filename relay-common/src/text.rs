//! Text helpers for chat message normalization.
//!
//! Chat programs render message timestamps as relative markers rather
//! than absolute datetimes. `parse_message_time` maps the marker text
//! back to a concrete time, relative to a caller-supplied `now`:
//!
//! | Marker                  | Interpreted as                     |
//! |-------------------------|------------------------------------|
//! | `MM-DD HH:MM:SS`        | that date in the current year      |
//! | `H:M`                   | today at that time                 |
//! | `昨天 H:M`              | yesterday at that time             |
//! | `昨天`                  | yesterday at midnight              |
//! | `星期X H:M`             | most recent such weekday           |
//! | `星期X`                 | most recent such weekday, midnight |
//! | `YYYY年M月D日 H:M`      | that exact date and time           |
//! | `YY/M/D`                | that date at midnight              |
//!
//! Anything else yields `None`.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

// ============================================================================
// Mention stripping
// ============================================================================

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\S+\s?").unwrap());

/// Remove all `@name` mentions from a message and trim the remainder.
pub fn strip_mentions(text: &str) -> String {
    MENTION_RE.replace_all(text, "").trim().to_string()
}

// ============================================================================
// Tag stripping
// ============================================================================

/// Remove `<tag ...>...</tag>` blocks for each of the given tag names.
///
/// Matching spans newlines, so multi-line reasoning blocks are removed
/// whole. Tag names are escaped before being spliced into the pattern.
/// The result is not trimmed.
pub fn strip_tags(text: &str, tags: &[String]) -> String {
    let mut out = text.to_string();
    for tag in tags {
        let pattern = format!(r"(?s)<{tag}[^>]*?>.*?</{tag}>", tag = regex::escape(tag));
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, "").into_owned();
        }
    }
    out
}

// ============================================================================
// Time marker parsing
// ============================================================================

static MONTH_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2})$").unwrap());

static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{1,2})$").unwrap());

static YESTERDAY_CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^昨天 (\d{1,2}):(\d{1,2})$").unwrap());

static YESTERDAY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^昨天$").unwrap());

static WEEKDAY_CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^星期([一二三四五六日]) (\d{1,2}):(\d{1,2})$").unwrap());

static WEEKDAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^星期([一二三四五六日])$").unwrap());

static FULL_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})年(\d{1,2})月(\d{1,2})日 (\d{1,2}):(\d{1,2})$").unwrap());

static SLASH_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{1,2})$").unwrap());

/// Index of a Chinese weekday character, Monday = 0.
fn weekday_index(ch: &str) -> Option<i64> {
    match ch {
        "一" => Some(0),
        "二" => Some(1),
        "三" => Some(2),
        "四" => Some(3),
        "五" => Some(4),
        "六" => Some(5),
        "日" => Some(6),
        _ => None,
    }
}

/// Most recent date on or before `now` falling on the given weekday.
fn last_weekday(now: NaiveDateTime, target: i64) -> NaiveDate {
    let today = i64::from(now.weekday().num_days_from_monday());
    let delta = (today - target).rem_euclid(7);
    now.date() - chrono::Duration::days(delta)
}

/// Parse a relative time marker into a concrete datetime.
///
/// Returns `None` for unrecognized markers and for markers that match
/// a known shape but carry impossible component values.
pub fn parse_message_time(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    if let Some(caps) = MONTH_DAY_RE.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let hour: u32 = caps[3].parse().ok()?;
        let minute: u32 = caps[4].parse().ok()?;
        let second: u32 = caps[5].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(now.year(), month, day)?;
        return date.and_hms_opt(hour, minute, second);
    }

    if let Some(caps) = CLOCK_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        return now.date().and_hms_opt(hour, minute, 0);
    }

    if let Some(caps) = YESTERDAY_CLOCK_RE.captures(text) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps[2].parse().ok()?;
        let yesterday = now.date() - chrono::Duration::days(1);
        return yesterday.and_hms_opt(hour, minute, 0);
    }

    if YESTERDAY_RE.is_match(text) {
        let yesterday = now.date() - chrono::Duration::days(1);
        return yesterday.and_hms_opt(0, 0, 0);
    }

    if let Some(caps) = WEEKDAY_CLOCK_RE.captures(text) {
        let target = weekday_index(&caps[1])?;
        let hour: u32 = caps[2].parse().ok()?;
        let minute: u32 = caps[3].parse().ok()?;
        return last_weekday(now, target).and_hms_opt(hour, minute, 0);
    }

    if let Some(caps) = WEEKDAY_RE.captures(text) {
        let target = weekday_index(&caps[1])?;
        return last_weekday(now, target).and_hms_opt(0, 0, 0);
    }

    if let Some(caps) = FULL_DATE_RE.captures(text) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let hour: u32 = caps[4].parse().ok()?;
        let minute: u32 = caps[5].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return date.and_hms_opt(hour, minute, 0);
    }

    if let Some(caps) = SLASH_DATE_RE.captures(text) {
        let yy: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        // Two-digit years pivot at 69, POSIX style
        let year = if yy <= 68 { 2000 + yy } else { 1900 + yy };
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return date.and_hms_opt(0, 0, 0);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-06-15 is a Saturday.
    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_month_day_marker_uses_current_year() {
        let parsed = parse_message_time("06-01 08:30:15", noon());
        assert_eq!(parsed, Some(at(2024, 6, 1, 8, 30, 15)));
    }

    #[test]
    fn test_clock_marker_is_today() {
        let parsed = parse_message_time("9:5", noon());
        assert_eq!(parsed, Some(at(2024, 6, 15, 9, 5, 0)));
    }

    #[test]
    fn test_yesterday_markers() {
        assert_eq!(
            parse_message_time("昨天 23:59", noon()),
            Some(at(2024, 6, 14, 23, 59, 0))
        );
        assert_eq!(
            parse_message_time("昨天", noon()),
            Some(at(2024, 6, 14, 0, 0, 0))
        );
    }

    #[test]
    fn test_weekday_marker_goes_backwards() {
        // Saturday the 15th, asking for Wednesday: three days back
        assert_eq!(
            parse_message_time("星期三 10:00", noon()),
            Some(at(2024, 6, 12, 10, 0, 0))
        );
        // Same weekday resolves to today
        assert_eq!(
            parse_message_time("星期六", noon()),
            Some(at(2024, 6, 15, 0, 0, 0))
        );
        // Sunday is six days back, never tomorrow
        assert_eq!(
            parse_message_time("星期日 8:0", noon()),
            Some(at(2024, 6, 9, 8, 0, 0))
        );
    }

    #[test]
    fn test_full_date_marker() {
        assert_eq!(
            parse_message_time("2023年1月5日 14:30", noon()),
            Some(at(2023, 1, 5, 14, 30, 0))
        );
    }

    #[test]
    fn test_slash_date_marker() {
        assert_eq!(
            parse_message_time("23/5/1", noon()),
            Some(at(2023, 5, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_unrecognized_marker_is_none() {
        assert_eq!(parse_message_time("three days ago", noon()), None);
        assert_eq!(parse_message_time("", noon()), None);
    }

    #[test]
    fn test_impossible_components_are_none() {
        // Matches the MM-DD shape but names month 13
        assert_eq!(parse_message_time("13-45 10:00:00", noon()), None);
        // Matches the clock shape but names hour 25
        assert_eq!(parse_message_time("25:61", noon()), None);
    }

    #[test]
    fn test_strip_mentions() {
        assert_eq!(strip_mentions("@relay hello there"), "hello there");
        assert_eq!(strip_mentions("@a @b hi"), "hi");
        assert_eq!(strip_mentions("  plain text  "), "plain text");
    }

    #[test]
    fn test_strip_tags_removes_blocks() {
        let tags = vec!["think".to_string()];
        assert_eq!(strip_tags("<think>x</think>Hello", &tags), "Hello");
        assert_eq!(
            strip_tags("<think>\nline one\nline two\n</think>Answer", &tags),
            "Answer"
        );
        assert_eq!(strip_tags("<think id=\"1\">x</think>ok", &tags), "ok");
    }

    #[test]
    fn test_strip_tags_leaves_other_tags() {
        let tags = vec!["think".to_string()];
        assert_eq!(strip_tags("<code>x</code>rest", &tags), "<code>x</code>rest");
    }

    #[test]
    fn test_strip_tags_escapes_tag_names() {
        // A dot in the tag name must not act as a wildcard
        let tags = vec!["a.b".to_string()];
        assert_eq!(strip_tags("<acb>x</acb>rest", &tags), "<acb>x</acb>rest");
        assert_eq!(strip_tags("<a.b>x</a.b>rest", &tags), "rest");
    }

    #[test]
    fn test_strip_tags_does_not_trim() {
        let tags = vec!["think".to_string()];
        assert_eq!(strip_tags("<think>x</think> Hello ", &tags), " Hello ");
    }
}
