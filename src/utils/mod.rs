use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::models::{CurrentScore, InningsScore, Match};

/// Parse the timestamp shapes the backend emits: RFC 3339, `YYYY-MM-DD HH:MM:SS`,
/// bare dates, and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&d));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&d));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| Utc.from_utc_datetime(&d))
}

/// Split cricket overs notation (`18.2` = 18 overs, 2 balls).
pub fn split_overs(overs: f64) -> (u32, u32) {
    if !overs.is_finite() || overs < 0.0 {
        return (0, 0);
    }
    let whole = overs.floor();
    let balls = ((overs - whole) * 10.0).round() as u32;
    (whole as u32, balls.min(6))
}

/// Format one innings as `145/3 (18.2)`.
pub fn format_innings(score: &InningsScore) -> String {
    if score.balls > 0 {
        format!("{}/{} ({}.{})", score.runs, score.wickets, score.overs, score.balls)
    } else {
        format!("{}/{} ({})", score.runs, score.wickets, score.overs)
    }
}

pub fn format_score(m: &Match) -> String {
    match &m.current_score {
        Some(CurrentScore::Cricket { home, away }) => {
            let side = |s: &Option<InningsScore>| s.as_ref().map_or("-".to_string(), format_innings);
            format!("{} | {}", side(home), side(away))
        }
        Some(CurrentScore::Football { home, away }) => format!("{}-{}", home, away),
        None => "(not started)".to_string(),
    }
}

// ── JSON field helpers ───────────────────────────────────────────────────────

/// First key present with a non-empty string (or number) value.
pub fn str_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub fn value_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

/// Numbers and numeric strings; rejects NaN and infinities.
pub fn as_f64(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

/// Non-negative counts; fractional values are floored.
pub fn as_u32(value: &Value) -> Option<u32> {
    let f = as_f64(value)?;
    (f >= 0.0 && f <= u32::MAX as f64).then(|| f.floor() as u32)
}

/// A string, or an object carrying one of `keys`.
pub fn name_of(value: &Value, keys: &[&str]) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(obj) => str_field(obj, keys),
        _ => None,
    }
}

// ── Team lookup ──────────────────────────────────────────────────────────────

/// Fuzzy team-name match: normalises common suffixes, then checks containment
/// both ways and falls back to Jaro-Winkler similarity.
pub fn names_match(a: &str, b: &str) -> bool {
    let norm = |s: &str| -> String {
        s.to_lowercase()
            .replace(" fc", "")
            .replace("fc ", "")
            .replace(" cc", "")
            .replace(" xi", "")
            .replace('.', "")
            .replace('-', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let a = norm(a);
    let b = norm(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.contains(&b) || b.contains(&a) || strsim::jaro_winkler(&a, &b) >= 0.9
}

pub fn find_match_by_team<'a>(matches: &'a [Match], query: &str) -> Option<&'a Match> {
    matches.iter().find(|m| {
        let home = &m.teams.home;
        let away = &m.teams.away;
        names_match(&home.name, query)
            || names_match(&away.name, query)
            || home.short_name.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(query.trim()))
            || away.short_name.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(query.trim()))
    })
}

/// Match ids are interpolated into upstream paths.
pub fn validate_match_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `"ODI, test"` → `["odi", "test"]`
pub fn parse_format_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
