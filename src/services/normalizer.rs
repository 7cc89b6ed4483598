use serde_json::{Map, Value};

use crate::models::{Competition, CurrentScore, InningsScore, Match, MatchStatus, Team, Teams};
use crate::utils::{as_f64, as_u32, name_of, parse_timestamp, split_overs, str_field, value_field};

const UNKNOWN_TEAM: &str = "TBD";

/// Why an upstream match object was left out of the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NotAnObject,
    MissingId,
    /// Both `format` and `league` set, or neither.
    AmbiguousSport,
    UnknownStatus,
}

/// Map one upstream match object onto a `Match`. `implied_status` is what the
/// endpoint it came from implies (live, results, fixtures) and is used when
/// the item's own status is missing or unrecognised.
pub fn normalize_match(raw: &Value, implied_status: Option<MatchStatus>) -> Result<Match, Rejection> {
    let obj = raw.as_object().ok_or(Rejection::NotAnObject)?;

    let id = str_field(obj, &["id", "_id", "matchId"]).ok_or(Rejection::MissingId)?;
    let competition = competition(obj)?;

    let status = str_field(obj, &["status"])
        .and_then(|s| parse_status(&s))
        .or(implied_status)
        .ok_or(Rejection::UnknownStatus)?;

    let current_score = match &competition {
        Competition::Format(_) => cricket_score(obj),
        Competition::League(_) => football_score(obj),
    };

    Ok(Match {
        id,
        competition,
        teams: teams(obj),
        venue: value_field(obj, &["venue"]).and_then(venue),
        status,
        start_time: value_field(obj, &["startTime", "date", "matchDate", "startDate"]).and_then(parse_timestamp),
        current_score,
        result: value_field(obj, &["result"]).and_then(|v| name_of(v, &["summary", "text", "description"])),
        run_rate: value_field(obj, &["runRate", "currentRunRate"]).and_then(as_f64),
        required_run_rate: value_field(obj, &["requiredRunRate"]).and_then(as_f64),
    })
}

fn competition(obj: &Map<String, Value>) -> Result<Competition, Rejection> {
    match (str_field(obj, &["format"]), str_field(obj, &["league"])) {
        (Some(format), None) => Ok(Competition::Format(format)),
        (None, Some(league)) => Ok(Competition::League(league)),
        _ => Err(Rejection::AmbiguousSport),
    }
}

pub fn parse_status(raw: &str) -> Option<MatchStatus> {
    let status = match raw.trim().to_lowercase().as_str() {
        "live" | "in_progress" | "in progress" | "inprogress" | "in_play" | "paused"
        | "innings break" | "halftime" => MatchStatus::Live,
        "completed" | "complete" | "finished" | "result" | "ft" | "ended" => MatchStatus::Completed,
        "upcoming" | "scheduled" | "not_started" | "fixture" | "timed" | "preview" => MatchStatus::Upcoming,
        "cancelled" | "canceled" | "abandoned" | "postponed" | "no result" => MatchStatus::Cancelled,
        _ => return None,
    };
    Some(status)
}

fn teams(obj: &Map<String, Value>) -> Teams {
    let nested = obj.get("teams").and_then(Value::as_object);

    let side = |nested_key: &str, flat_keys: [&str; 2]| -> Team {
        nested
            .and_then(|t| t.get(nested_key))
            .or_else(|| value_field(obj, &flat_keys))
            .and_then(team)
            .unwrap_or_else(|| Team::named(UNKNOWN_TEAM))
    };

    Teams {
        home: side("home", ["homeTeam", "team1"]),
        away: side("away", ["awayTeam", "team2"]),
    }
}

fn team(value: &Value) -> Option<Team> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Team::named(s.trim())),
        Value::Object(obj) => Some(Team {
            name: str_field(obj, &["name", "teamName"])?,
            short_name: str_field(obj, &["shortName", "short_name", "code"]),
            logo_url: str_field(obj, &["logo", "logoUrl", "logo_url"]),
        }),
        _ => None,
    }
}

fn venue(value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => {
            let name = str_field(obj, &["name"])?;
            Some(match str_field(obj, &["city"]) {
                Some(city) => format!("{}, {}", name, city),
                None => name,
            })
        }
        other => name_of(other, &[]),
    }
}

fn cricket_score(obj: &Map<String, Value>) -> Option<CurrentScore> {
    let score = obj.get("currentScore")?.as_object()?;
    let home = score.get("home").and_then(innings);
    let away = score.get("away").and_then(innings);
    if home.is_none() && away.is_none() {
        return None;
    }
    Some(CurrentScore::Cricket { home, away })
}

fn innings(value: &Value) -> Option<InningsScore> {
    let obj = value.as_object()?;
    let runs = obj.get("runs").and_then(as_u32)?;
    let wickets = obj.get("wickets").and_then(as_u32).unwrap_or(0);

    let raw_overs = obj.get("overs").and_then(as_f64).unwrap_or(0.0);
    let (overs, balls) = match obj.get("balls").and_then(as_u32) {
        Some(balls) => (split_overs(raw_overs).0, balls),
        None => split_overs(raw_overs),
    };

    Some(InningsScore { runs, wickets, overs, balls })
}

fn football_score(obj: &Map<String, Value>) -> Option<CurrentScore> {
    let score = value_field(obj, &["currentScore", "score"])?.as_object()?;
    Some(CurrentScore::Football {
        home: score.get("home").and_then(as_u32)?,
        away: score.get("away").and_then(as_u32)?,
    })
}
