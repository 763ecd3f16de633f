//! `xs:duration` conversion for the `Duration` extension element.

use std::time::Duration;

use crate::{Error, Result};

/// Format as `PT<seconds>[.<fraction>]S`.
pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        return format!("PT{secs}S");
    }
    let fraction = format!("{nanos:09}");
    format!("PT{secs}.{}S", fraction.trim_end_matches('0'))
}

/// Parse the day/time subset of `xs:duration` (`PnDTnHnMn.nS`).
///
/// Years and months have no fixed length and are rejected, as are negative
/// durations.
pub(crate) fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || Error::malformed(format!("invalid duration: {text:?}"));
    let rest = text.trim().strip_prefix('P').ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let (date, time) = match rest.split_once('T') {
        Some((_, "")) => return Err(invalid()),
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    let mut total = Duration::ZERO;
    for (value, unit) in components(date).ok_or_else(invalid)? {
        let part = match unit {
            'D' => scaled(value, 86_400),
            _ => None,
        };
        total = part.and_then(|part| total.checked_add(part)).ok_or_else(invalid)?;
    }
    for (value, unit) in components(time).ok_or_else(invalid)? {
        let part = match unit {
            'H' => scaled(value, 3_600),
            'M' => scaled(value, 60),
            'S' => seconds(value),
            _ => None,
        };
        total = part.and_then(|part| total.checked_add(part)).ok_or_else(invalid)?;
    }
    Ok(total)
}

fn components(text: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c.is_ascii_alphabetic() {
            if i == start {
                return None;
            }
            out.push((&text[start..i], c));
            start = i + 1;
        }
    }
    if start != text.len() {
        return None;
    }
    Some(out)
}

fn scaled(value: &str, unit_secs: u64) -> Option<Duration> {
    whole(value)?.checked_mul(unit_secs).map(Duration::from_secs)
}

fn whole(value: &str) -> Option<u64> {
    if value.bytes().all(|b| b.is_ascii_digit()) {
        value.parse().ok()
    } else {
        None
    }
}

fn seconds(value: &str) -> Option<Duration> {
    let (secs, fraction) = value.split_once('.').unwrap_or((value, ""));
    let secs = whole(secs)?;
    if fraction.is_empty() {
        return Some(Duration::from_secs(secs));
    }
    if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos: u32 = format!("{fraction:0<9}").parse().ok()?;
    Some(Duration::new(secs, nanos))
}
