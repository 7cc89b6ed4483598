//! Ball-by-ball commentary normalization.
//!
//! The backend serves commentary either pre-split by innings
//! (`{firstInnings, secondInnings, all}`) or as a flat list whose entries
//! carry a `scoreboard` tag (`S1`/`S2`). Both end up as `CommentaryBuckets`,
//! each bucket validated and ordered newest ball first.

use serde_json::{Map, Value};

use crate::models::{CommentaryBuckets, CommentaryEntry};
use crate::utils::{as_f64, as_u32, name_of, parse_timestamp, str_field, value_field};

const MAX_BALL: u64 = 6;
const FLAT_KEYS: [&str; 3] = ["commentary", "entries", "items"];
const SPLIT_KEYS: [&str; 3] = ["firstInnings", "secondInnings", "all"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Innings {
    First,
    Second,
}

pub fn normalize_payload(data: &Value) -> Result<CommentaryBuckets, String> {
    match data {
        Value::Null => Ok(CommentaryBuckets::default()),
        Value::Array(items) => Ok(from_flat(items)),
        Value::Object(obj) => {
            if SPLIT_KEYS.iter().any(|k| obj.contains_key(*k)) {
                return Ok(from_split(obj));
            }
            if let Some(items) = FLAT_KEYS.iter().find_map(|k| obj.get(*k).and_then(Value::as_array)) {
                return Ok(from_flat(items));
            }
            match obj.get("data") {
                Some(inner) => normalize_payload(inner),
                None => Err("no commentary list in response".to_string()),
            }
        }
        other => Err(format!("commentary payload is not a list or object: {}", other)),
    }
}

fn from_split(obj: &Map<String, Value>) -> CommentaryBuckets {
    let bucket = |key: &str| -> Vec<CommentaryEntry> {
        let entries = obj
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(normalize_entry).collect())
            .unwrap_or_default();
        sorted(entries)
    };

    let first_innings = bucket("firstInnings");
    let second_innings = bucket("secondInnings");
    let mut all = bucket("all");
    if all.is_empty() {
        all = sorted(first_innings.iter().chain(second_innings.iter()).cloned().collect());
    }

    CommentaryBuckets { first_innings, second_innings, all }
}

fn from_flat(items: &[Value]) -> CommentaryBuckets {
    let mut buckets = CommentaryBuckets::default();

    for item in items {
        let Some(entry) = normalize_entry(item) else {
            continue;
        };
        match item.as_object().and_then(innings_tag) {
            Some(Innings::First) => buckets.first_innings.push(entry.clone()),
            Some(Innings::Second) => buckets.second_innings.push(entry.clone()),
            None => {}
        }
        buckets.all.push(entry);
    }

    CommentaryBuckets {
        first_innings: sorted(buckets.first_innings),
        second_innings: sorted(buckets.second_innings),
        all: sorted(buckets.all),
    }
}

fn innings_tag(obj: &Map<String, Value>) -> Option<Innings> {
    if let Some(tag) = str_field(obj, &["scoreboard"]) {
        return match tag.to_uppercase().as_str() {
            "S1" => Some(Innings::First),
            "S2" => Some(Innings::Second),
            _ => None,
        };
    }
    match obj.get("innings").and_then(Value::as_u64) {
        Some(1) => Some(Innings::First),
        Some(2) => Some(Innings::Second),
        _ => None,
    }
}

/// Validate one entry. `over` is floored to the over number and must end up
/// at least 1; `ballNumber` must be a whole number in `0..=6` and defaults
/// to 0 when absent.
pub fn normalize_entry(raw: &Value) -> Option<CommentaryEntry> {
    let obj = raw.as_object()?;

    let over = obj.get("over").and_then(as_f64)?;
    if over < 1.0 {
        return None;
    }
    let over = over.floor() as u32;

    let ball_number = match value_field(obj, &["ballNumber", "ball"]) {
        None => 0,
        Some(v) => ball(v)?,
    };

    let wickets = match obj.get("wickets").and_then(as_u32) {
        Some(w) => Some(w),
        None => obj.get("isWicket").and_then(Value::as_bool).filter(|w| *w).map(|_| 1),
    };

    Some(CommentaryEntry {
        id: str_field(obj, &["id", "_id"]),
        over,
        ball_number,
        runs: obj.get("runs").and_then(as_u32).unwrap_or(0),
        wickets,
        commentary: str_field(obj, &["commentary", "text", "description"]).unwrap_or_default(),
        batsman: obj.get("batsman").and_then(|v| name_of(v, &["name"])),
        bowler: obj.get("bowler").and_then(|v| name_of(v, &["name"])),
        timestamp: value_field(obj, &["timestamp", "createdAt"]).and_then(parse_timestamp),
    })
}

fn ball(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= 0.0).then_some(f as u64)
        })?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    (n <= MAX_BALL).then_some(n as u8)
}

/// Newest ball first. Stable, so entries for the same ball keep upstream order.
fn sorted(mut entries: Vec<CommentaryEntry>) -> Vec<CommentaryEntry> {
    entries.sort_by(|a, b| (b.over, b.ball_number).cmp(&(a.over, a.ball_number)));
    entries
}
