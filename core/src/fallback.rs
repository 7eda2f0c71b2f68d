//! Deterministic date/time extraction used when the text-completion
//! collaborator cannot be reached or returns garbage.
//!
//! Strategies are tried in order, each only when the previous one found
//! nothing: (1) the entire input is one date/time expression, (2) a
//! known date-plus-time phrase shape somewhere in the text, (3) a
//! date-only phrase and a separate time-only phrase, combined. The
//! parser never guesses a duration or location; those slots always go
//! to follow-up.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::DateTime;
use chrono::Datelike;
use chrono::Duration;
use chrono::Local;
use chrono::NaiveDate;
use chrono::NaiveTime;
use chrono::Weekday;
use regex::Regex;

use crate::event::DURATION_QUESTION;
use crate::event::EventSpec;
use crate::event::LOCATION_QUESTION;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Could not parse date/time from prompt")]
    NoDateTime,
}

static AMPM_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").unwrap()
});
static CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap()
});
static RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\bin\s+(\d+)\s*(hours?|hrs?|minutes?|mins?)\b").unwrap()
});
static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(?:next\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .unwrap()
});
static MONTH_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?\b",
    )
    .unwrap()
});
static NUMERIC_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap()
});
static TODAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\btoday\b").unwrap()
});
static TOMORROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\btomorrow\b").unwrap()
});
static CONNECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)\b(at|on|the|next)\b").unwrap()
});
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\s+").unwrap()
});

/// Words stripped from the prompt when deriving a title.
const TITLE_STOP_WORDS: &[&str] = &[
    "today", "tomorrow", "next", "at", "on", "in", "for", "minutes", "hours", "am", "pm",
];

/// Best-effort extraction of a start time and title from free text.
/// Relative expressions resolve against `now`. Duration and location
/// are never inferred here, so the result always asks for follow-up.
pub fn parse(text: &str, now: DateTime<Local>) -> Result<EventSpec, ParseError> {
    let start = whole_expression(text, now)
        .or_else(|| combined_phrase(text, now))
        .or_else(|| split_date_and_time(text, now))
        .ok_or(ParseError::NoDateTime)?;

    tracing::debug!(start = %start, "fallback parser resolved start time");

    let mut spec = EventSpec::new(derive_title(text));
    spec.start_time = Some(start);
    spec.needs_followup = true;
    spec.followup_questions = vec![
        DURATION_QUESTION.to_string(),
        LOCATION_QUESTION.to_string(),
    ];
    Ok(spec)
}

/// Strategy 1: the entire input is a single date/time expression, e.g.
/// "tomorrow at 3pm" or "in 2 hours". Anything left over besides
/// connective words disqualifies this strategy.
fn whole_expression(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if let Some(caps) = RELATIVE_RE.captures(text) {
        let whole = caps.get(0)?;
        if residue_is_empty(text, &[whole.range()]) {
            return relative_from(now, &caps);
        }
    }

    let date = find_date(text, now);
    let time = find_time(text);
    let mut consumed: Vec<Range<usize>> = Vec::new();
    if let Some((_, span)) = &date {
        consumed.push(span.clone());
    }
    if let Some((_, span)) = &time {
        consumed.push(span.clone());
    }
    if consumed.is_empty() || !residue_is_empty(text, &consumed) {
        return None;
    }
    combine(date.map(|(d, _)| d), time.map(|(t, _)| t), now)
}

/// Strategy 2: a known phrase shape inside longer text, either a date
/// immediately followed by a time ("Friday at 2pm", "7/15 at 9am") or a
/// bare am/pm time ("3pm").
fn combined_phrase(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    if let Some((date, span)) = find_date(text, now) {
        let rest = &text[span.end..];
        if let Some((time, time_span)) = find_time(rest) {
            let gap = &rest[..time_span.start];
            if gap.trim().is_empty() || gap.trim().eq_ignore_ascii_case("at") {
                return combine(Some(date), Some(time), now);
            }
        }
    }

    if let Some(caps) = AMPM_RE.captures(text) {
        let time = time_from_ampm(&caps)?;
        return combine(None, Some(time), now);
    }
    None
}

/// Strategy 3: a date phrase and a time phrase that are not adjacent,
/// e.g. "Friday review the report 2pm". Both must be present.
fn split_date_and_time(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let (date, _) = find_date(text, now)?;
    let (time, _) = find_time(text)?;
    combine(Some(date), Some(time), now)
}

fn relative_from(now: DateTime<Local>, caps: &regex::Captures<'_>) -> Option<DateTime<Local>> {
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    let delta = if unit.starts_with('h') {
        Duration::hours(amount)
    } else {
        Duration::minutes(amount)
    };
    Some(now + delta)
}

fn find_time(text: &str) -> Option<(NaiveTime, Range<usize>)> {
    if let Some(caps) = AMPM_RE.captures(text) {
        let span = caps.get(0)?.range();
        let time = time_from_ampm(&caps)?;
        return Some((time, span));
    }
    if let Some(caps) = CLOCK_RE.captures(text) {
        let span = caps.get(0)?.range();
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
        return Some((time, span));
    }
    None
}

fn time_from_ampm(caps: &regex::Captures<'_>) -> Option<NaiveTime> {
    let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let minute: u32 = caps
        .get(2)
        .map(|m| m.as_str().parse().ok())
        .unwrap_or(Some(0))?;
    let meridiem = caps.get(3)?.as_str().to_ascii_lowercase();
    let hour = match (hour % 12, meridiem.as_str()) {
        (h, "pm") => h + 12,
        (h, _) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn find_date(text: &str, now: DateTime<Local>) -> Option<(NaiveDate, Range<usize>)> {
    let today = now.date_naive();

    if let Some(m) = TODAY_RE.find(text) {
        return Some((today, m.range()));
    }
    if let Some(m) = TOMORROW_RE.find(text) {
        return Some((today + Duration::days(1), m.range()));
    }
    if let Some(caps) = WEEKDAY_RE.captures(text) {
        let span = caps.get(0)?.range();
        let target = weekday_from_name(caps.get(1)?.as_str())?;
        let mut ahead =
            i64::from((target.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7);
        if ahead == 0 {
            ahead = 7;
        }
        return Some((today + Duration::days(ahead), span));
    }
    if let Some(caps) = MONTH_DATE_RE.captures(text) {
        let span = caps.get(0)?.range();
        let month = month_from_name(caps.get(1)?.as_str())?;
        let day: u32 = caps.get(2)?.as_str().parse().ok()?;
        let mut date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
        if date < today {
            date = NaiveDate::from_ymd_opt(today.year() + 1, month, day)?;
        }
        return Some((date, span));
    }
    if let Some(caps) = NUMERIC_DATE_RE.captures(text) {
        let span = caps.get(0)?.range();
        let month: u32 = caps.get(1)?.as_str().parse().ok()?;
        let day: u32 = caps.get(2)?.as_str().parse().ok()?;
        match caps.get(3) {
            Some(year) => {
                let mut year: i32 = year.as_str().parse().ok()?;
                if year < 100 {
                    year += 2000;
                }
                return Some((NaiveDate::from_ymd_opt(year, month, day)?, span));
            }
            None => {
                let mut date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
                if date < today {
                    date = NaiveDate::from_ymd_opt(today.year() + 1, month, day)?;
                }
                return Some((date, span));
            }
        }
    }
    None
}

/// Anchors a parsed date and/or time to a concrete local instant,
/// preferring the future: a bare time already past today moves to
/// tomorrow, a date without a time takes the current wall-clock time.
fn combine(
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    let today = now.date_naive();
    match (date, time) {
        (Some(date), Some(time)) => local_instant(date, time),
        (Some(date), None) => local_instant(date, now.time()),
        (None, Some(time)) => {
            let candidate = local_instant(today, time)?;
            if candidate <= now {
                local_instant(today + Duration::days(1), time)
            } else {
                Some(candidate)
            }
        }
        (None, None) => None,
    }
}

fn local_instant(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    date.and_time(time).and_local_timezone(Local).single()
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.to_ascii_lowercase().as_str() {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.to_ascii_lowercase().as_str() {
        "january" => 1,
        "february" => 2,
        "march" => 3,
        "april" => 4,
        "may" => 5,
        "june" => 6,
        "july" => 7,
        "august" => 8,
        "september" => 9,
        "october" => 10,
        "november" => 11,
        "december" => 12,
        _ => return None,
    };
    Some(month)
}

/// True when nothing but connective words and punctuation remains once
/// the matched spans are removed.
fn residue_is_empty(text: &str, consumed: &[Range<usize>]) -> bool {
    let mut masked: Vec<u8> = text.bytes().collect();
    for range in consumed {
        for byte in &mut masked[range.clone()] {
            *byte = b' ';
        }
    }
    let masked = String::from_utf8_lossy(&masked).into_owned();
    let without_connectors = CONNECTOR_RE.replace_all(&masked, " ");
    without_connectors
        .chars()
        .all(|c| !c.is_alphanumeric())
}

/// Title is the prompt minus temporal stop words, whitespace collapsed.
fn derive_title(text: &str) -> String {
    let mut title = text.to_string();
    for word in TITLE_STOP_WORDS {
        #[allow(clippy::unwrap_used)]
        let re = Regex::new(&format!(r"(?i)\b{word}\b")).unwrap();
        title = re.replace_all(&title, "").into_owned();
    }
    WHITESPACE_RE.replace_all(title.trim(), " ").into_owned()
}
