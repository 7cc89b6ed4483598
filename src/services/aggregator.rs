use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{Aggregate, Match, MatchStatus, Sport, Tier};

/// Ranking of cricket formats used when a results query mixes several.
/// Formats not listed rank after all listed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPrecedence(Vec<String>);

impl FormatPrecedence {
    pub fn new<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(formats.into_iter().map(|f| f.as_ref().trim().to_lowercase()).collect())
    }

    pub fn rank(&self, format: Option<&str>) -> usize {
        format
            .map(str::to_lowercase)
            .and_then(|f| self.0.iter().position(|p| *p == f))
            .unwrap_or(self.0.len())
    }
}

impl Default for FormatPrecedence {
    fn default() -> Self {
        Self::new(["t20", "t20i", "odi", "test"])
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormatFilter {
    /// Lowercased; empty means no filtering.
    pub formats: Vec<String>,
    pub precedence: FormatPrecedence,
}

impl FormatFilter {
    fn admits(&self, m: &Match) -> bool {
        if self.formats.is_empty() {
            return true;
        }
        m.competition
            .format()
            .is_some_and(|f| self.formats.iter().any(|wanted| wanted.eq_ignore_ascii_case(f)))
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub cap: usize,
    /// Upcoming matches further out than this are left out. `None` keeps all.
    pub upcoming_window: Option<Duration>,
    pub filter: FormatFilter,
}

// ── Ordering helpers ─────────────────────────────────────────────────────────

/// Missing start times sort last in both directions.
fn by_start(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>, newest_first: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) if newest_first => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn recency(a: &Match, b: &Match) -> Ordering {
    by_start(a.start_time, b.start_time, true).then_with(|| a.id.cmp(&b.id))
}

fn soonness(a: &Match, b: &Match) -> Ordering {
    by_start(a.start_time, b.start_time, false).then_with(|| a.id.cmp(&b.id))
}

/// Keep the first occurrence of each `(sport, id)` pair.
fn dedupe(matches: Vec<Match>) -> Vec<Match> {
    let mut seen: HashSet<(Sport, String)> = HashSet::new();
    matches
        .into_iter()
        .filter(|m| seen.insert((m.sport(), m.id.clone())))
        .collect()
}

// ── Tiers ────────────────────────────────────────────────────────────────────

pub fn rank_live(matches: Vec<Match>) -> Vec<Match> {
    let mut live: Vec<Match> = dedupe(matches)
        .into_iter()
        .filter(|m| m.status == MatchStatus::Live)
        .collect();
    live.sort_by(recency);
    live
}

pub fn rank_completed(matches: Vec<Match>, filter: &FormatFilter) -> Vec<Match> {
    let mut completed: Vec<Match> = dedupe(matches)
        .into_iter()
        .filter(|m| m.status == MatchStatus::Completed && filter.admits(m))
        .collect();

    if filter.formats.len() > 1 {
        completed.sort_by(|a, b| {
            let rank = |m: &Match| filter.precedence.rank(m.competition.format());
            rank(a).cmp(&rank(b)).then_with(|| recency(a, b))
        });
    } else {
        completed.sort_by(recency);
    }
    completed
}

pub fn rank_upcoming(matches: Vec<Match>, now: DateTime<Utc>, window: Option<Duration>) -> Vec<Match> {
    // A window reaching past the representable range is unbounded.
    let horizon = window.and_then(|w| now.checked_add_signed(w));
    let in_window = |m: &Match| match (window, horizon) {
        (None, _) => true,
        (Some(_), None) => m.start_time.is_some_and(|t| t >= now),
        (Some(_), Some(end)) => m.start_time.is_some_and(|t| t >= now && t <= end),
    };

    let mut upcoming: Vec<Match> = dedupe(matches)
        .into_iter()
        .filter(|m| m.status == MatchStatus::Upcoming && in_window(m))
        .collect();
    upcoming.sort_by(soonness);
    upcoming
}

/// Take the first non-empty tier from already-ranked lists, then cap.
pub fn cascade(live: Vec<Match>, completed: Vec<Match>, upcoming: Vec<Match>, cap: usize) -> Aggregate {
    let (tier, matches) = if !live.is_empty() {
        (Some(Tier::Live), live)
    } else if !completed.is_empty() {
        (Some(Tier::Completed), completed)
    } else if !upcoming.is_empty() {
        (Some(Tier::Upcoming), upcoming)
    } else {
        (None, Vec::new())
    };

    Aggregate {
        tier,
        matches: matches.into_iter().take(cap).collect(),
    }
}

/// Full pipeline over raw per-tier inputs.
pub fn aggregate(
    live: Vec<Match>,
    completed: Vec<Match>,
    upcoming: Vec<Match>,
    options: &AggregateOptions,
    now: DateTime<Utc>,
) -> Aggregate {
    cascade(
        rank_live(live),
        rank_completed(completed, &options.filter),
        rank_upcoming(upcoming, now, options.upcoming_window),
        options.cap,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Competition, Team, Teams};
    use chrono::TimeZone;

    pub(crate) fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap()
    }

    pub(crate) fn cricket(id: &str, format: &str, status: MatchStatus, start: Option<DateTime<Utc>>) -> Match {
        Match {
            id: id.to_string(),
            competition: Competition::Format(format.to_string()),
            teams: Teams {
                home: Team::named("Home"),
                away: Team::named("Away"),
            },
            venue: None,
            status,
            start_time: start,
            current_score: None,
            result: None,
            run_rate: None,
            required_run_rate: None,
        }
    }

    pub(crate) fn football(id: &str, status: MatchStatus, start: Option<DateTime<Utc>>) -> Match {
        Match {
            competition: Competition::League("EPL".to_string()),
            ..cricket(id, "", status, start)
        }
    }

    fn ids(matches: &[Match]) -> Vec<&str> {
        matches.iter().map(|m| m.id.as_str()).collect()
    }

    fn options(cap: usize) -> AggregateOptions {
        AggregateOptions {
            cap,
            upcoming_window: Some(Duration::hours(6)),
            filter: FormatFilter::default(),
        }
    }

    #[test]
    fn test_live_tier_short_circuits() {
        let live = vec![cricket("L1", "t20", MatchStatus::Live, Some(at(10)))];
        let completed = vec![
            cricket("C1", "odi", MatchStatus::Completed, Some(at(1))),
            cricket("C2", "odi", MatchStatus::Completed, Some(at(2))),
            cricket("C3", "odi", MatchStatus::Completed, Some(at(3))),
        ];

        let agg = aggregate(live, completed, vec![], &options(6), at(12));
        assert_eq!(agg.tier, Some(Tier::Live));
        assert_eq!(ids(&agg.matches), vec!["L1"]);
    }

    #[test]
    fn test_empty_live_falls_back_to_results_not_fixtures() {
        let completed = vec![
            cricket("C1", "t20", MatchStatus::Completed, Some(at(1))),
            football("F1", MatchStatus::Completed, Some(at(5))),
        ];
        let upcoming = vec![cricket("U1", "t20", MatchStatus::Upcoming, Some(at(13)))];

        let agg = aggregate(vec![], completed, upcoming, &options(6), at(12));
        assert_eq!(agg.tier, Some(Tier::Completed));
        assert_eq!(ids(&agg.matches), vec!["F1", "C1"]);
    }

    #[test]
    fn test_upcoming_tier_respects_window_and_soonest_first() {
        let upcoming = vec![
            cricket("U3", "t20", MatchStatus::Upcoming, Some(at(17))),
            cricket("U1", "t20", MatchStatus::Upcoming, Some(at(13))),
            cricket("U2", "t20", MatchStatus::Upcoming, Some(at(20))),
            cricket("U0", "t20", MatchStatus::Upcoming, Some(at(11))),
            cricket("UX", "t20", MatchStatus::Upcoming, None),
        ];

        let agg = aggregate(vec![], vec![], upcoming.clone(), &options(6), at(12));
        assert_eq!(agg.tier, Some(Tier::Upcoming));
        assert_eq!(ids(&agg.matches), vec!["U1", "U3"]);

        let unbounded = AggregateOptions { upcoming_window: None, ..options(6) };
        let agg = aggregate(vec![], vec![], upcoming, &unbounded, at(12));
        assert_eq!(ids(&agg.matches), vec!["U0", "U1", "U3", "U2", "UX"]);
    }

    #[test]
    fn test_window_past_calendar_range_is_unbounded() {
        let upcoming = vec![
            cricket("U1", "t20", MatchStatus::Upcoming, Some(at(13))),
            cricket("U0", "t20", MatchStatus::Upcoming, Some(at(11))),
        ];

        let ranked = rank_upcoming(upcoming, at(12), Some(Duration::weeks(1_000_000_000)));
        assert_eq!(ids(&ranked), vec!["U1"]);
    }

    #[test]
    fn test_nothing_anywhere_is_empty_aggregate() {
        let agg = aggregate(vec![], vec![], vec![], &options(4), at(12));
        assert_eq!(agg, Aggregate::default());
    }

    #[test]
    fn test_cap_applies_after_sort() {
        let live: Vec<Match> = (0..8)
            .map(|h| cricket(&format!("L{}", h), "t20", MatchStatus::Live, Some(at(h))))
            .collect();

        let agg = aggregate(live, vec![], vec![], &options(4), at(12));
        assert_eq!(ids(&agg.matches), vec!["L7", "L6", "L5", "L4"]);
    }

    #[test]
    fn test_odi_filter_keeps_only_odi_newest_first() {
        let completed = vec![
            cricket("T1", "t20i", MatchStatus::Completed, Some(at(9))),
            cricket("O1", "odi", MatchStatus::Completed, Some(at(2))),
            cricket("X1", "test", MatchStatus::Completed, Some(at(8))),
            cricket("O2", "ODI", MatchStatus::Completed, Some(at(6))),
            football("F1", MatchStatus::Completed, Some(at(7))),
        ];
        let filter = FormatFilter {
            formats: vec!["odi".to_string()],
            ..FormatFilter::default()
        };

        assert_eq!(ids(&rank_completed(completed, &filter)), vec!["O2", "O1"]);
    }

    #[test]
    fn test_mixed_format_filter_uses_precedence_then_recency() {
        let completed = vec![
            cricket("X1", "test", MatchStatus::Completed, Some(at(9))),
            cricket("O1", "odi", MatchStatus::Completed, Some(at(2))),
            cricket("T1", "t20", MatchStatus::Completed, Some(at(1))),
            cricket("O2", "odi", MatchStatus::Completed, Some(at(6))),
        ];
        let filter = FormatFilter {
            formats: vec!["test".to_string(), "odi".to_string(), "t20".to_string()],
            ..FormatFilter::default()
        };

        assert_eq!(ids(&rank_completed(completed, &filter)), vec!["T1", "O2", "O1", "X1"]);
    }

    #[test]
    fn test_precedence_is_configurable() {
        let precedence = FormatPrecedence::new(["Test", "ODI"]);
        assert_eq!(precedence.rank(Some("test")), 0);
        assert_eq!(precedence.rank(Some("odi")), 1);
        assert_eq!(precedence.rank(Some("t10")), 2);
        assert_eq!(precedence.rank(None), 2);
    }

    #[test]
    fn test_cancelled_and_wrong_status_never_leak_into_tiers() {
        let live = vec![
            cricket("L1", "t20", MatchStatus::Cancelled, Some(at(10))),
            cricket("L2", "t20", MatchStatus::Completed, Some(at(11))),
        ];
        assert!(rank_live(live).is_empty());
    }

    #[test]
    fn test_duplicates_across_sources_are_merged() {
        let live = vec![
            cricket("L1", "t20", MatchStatus::Live, Some(at(10))),
            football("L1", MatchStatus::Live, Some(at(9))),
            cricket("L1", "t20", MatchStatus::Live, Some(at(10))),
        ];
        let ranked = rank_live(live);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].sport(), Sport::Cricket);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let build = || {
            vec![
                cricket("B", "t20", MatchStatus::Live, Some(at(10))),
                cricket("A", "t20", MatchStatus::Live, Some(at(10))),
                football("C", MatchStatus::Live, None),
            ]
        };
        let first = aggregate(build(), vec![], vec![], &options(6), at(12));
        let second = aggregate(build(), vec![], vec![], &options(6), at(12));
        assert_eq!(first, second);
        assert_eq!(ids(&first.matches), vec!["A", "B", "C"]);
    }
}
