use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Cricket,
    Football,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Cricket => "cricket",
            Sport::Football => "football",
        }
    }
}

impl std::str::FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cricket" => Ok(Sport::Cricket),
            "football" | "soccer" => Ok(Sport::Football),
            other => Err(format!("unsupported sport '{}': use 'cricket' or 'football'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Live,
    Completed,
    Upcoming,
    Cancelled,
}

/// Sport discriminant. Upstream has no sport field: cricket matches carry a
/// `format`, football matches a `league`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Competition {
    Format(String),
    League(String),
}

impl Competition {
    pub fn sport(&self) -> Sport {
        match self {
            Competition::Format(_) => Sport::Cricket,
            Competition::League(_) => Sport::Football,
        }
    }

    pub fn format(&self) -> Option<&str> {
        match self {
            Competition::Format(f) => Some(f),
            Competition::League(_) => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Competition::Format(s) | Competition::League(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub name: String,
    pub short_name: Option<String>,
    pub logo_url: Option<String>,
}

impl Team {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            logo_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Teams {
    pub home: Team,
    pub away: Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InningsScore {
    pub runs: u32,
    pub wickets: u32,
    pub overs: u32,
    pub balls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CurrentScore {
    /// A side that has not batted yet is `None`.
    Cricket {
        home: Option<InningsScore>,
        away: Option<InningsScore>,
    },
    Football {
        home: u32,
        away: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: String,
    #[serde(flatten)]
    pub competition: Competition,
    pub teams: Teams,
    pub venue: Option<String>,
    pub status: MatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub current_score: Option<CurrentScore>,
    pub result: Option<String>,
    // Only ever copied from upstream, never derived from the score.
    pub run_rate: Option<f64>,
    pub required_run_rate: Option<f64>,
}

impl Match {
    pub fn sport(&self) -> Sport {
        self.competition.sport()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryEntry {
    pub id: Option<String>,
    pub over: u32,
    pub ball_number: u8,
    pub runs: u32,
    pub wickets: Option<u32>,
    pub commentary: String,
    pub batsman: Option<String>,
    pub bowler: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentaryBuckets {
    pub first_innings: Vec<CommentaryEntry>,
    pub second_innings: Vec<CommentaryEntry>,
    pub all: Vec<CommentaryEntry>,
}

impl CommentaryBuckets {
    pub fn is_empty(&self) -> bool {
        self.first_innings.is_empty() && self.second_innings.is_empty() && self.all.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Live,
    Completed,
    Upcoming,
}

/// One ranked projection of the upstream feeds. Rebuilt on every poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub tier: Option<Tier>,
    pub matches: Vec<Match>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
