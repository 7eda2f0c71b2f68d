//! Merges the user's single follow-up answer into a partial
//! [`EventSpec`]. Only fields actually found in the answer overlay the
//! original; everything else is untouched, so merging is idempotent for
//! unmentioned slots.

use std::sync::LazyLock;

use regex::Regex;

use crate::event::EventSpec;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"(?i)(\d+)\s*(minutes?|mins?|hours?|hrs?)").unwrap()
});

/// Keywords that introduce a location phrase, matched on word
/// boundaries so "in" does not fire inside "minutes".
const LOCATION_KEYWORDS: &[&str] = &["at", "in", "location", "venue", "place"];

static LOCATION_KEYWORD_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    LOCATION_KEYWORDS
        .iter()
        .map(|kw| {
            #[allow(clippy::unwrap_used)]
            Regex::new(&format!(r"(?i)\b{kw}\b\s*:?\s*")).unwrap()
        })
        .collect()
});

pub fn merge(mut spec: EventSpec, answer: &str) -> EventSpec {
    if let Some(minutes) = extract_duration(answer) {
        spec.duration_minutes = Some(minutes);
    }
    if let Some(location) = extract_location(answer) {
        spec.location = Some(location);
    }
    spec.finalize();
    spec
}

fn extract_duration(answer: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(answer)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_ascii_lowercase();
    if unit.starts_with('h') {
        Some(amount * 60)
    } else {
        Some(amount)
    }
}

fn extract_location(answer: &str) -> Option<String> {
    for re in LOCATION_KEYWORD_RES.iter() {
        if let Some(m) = re.find(answer) {
            let candidate = answer[m.end()..].trim();
            if candidate.len() > 2 {
                return Some(candidate.to_string());
            }
        }
    }

    // An answer with no keyword and no digits is taken verbatim, e.g.
    // "Conference Room B". The digit check keeps "1.5 hours" out.
    let trimmed = answer.trim();
    if trimmed.len() > 3 && !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return Some(trimmed.to_string());
    }
    None
}
