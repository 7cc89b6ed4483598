use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::models::{Aggregate, Match, MatchStatus, Sport};
use crate::services::aggregator::{self, AggregateOptions, FormatFilter};
use crate::services::poller::{Poller, PollerHandle};
use crate::services::upstream::{FetchError, MatchFeed, UpstreamClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    /// Live-matches grid.
    Live,
    /// Home page hero strip.
    Hero,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Live => "live",
            FeedKind::Hero => "hero",
        }
    }
}

impl std::str::FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(FeedKind::Live),
            "hero" => Ok(FeedKind::Hero),
            other => Err(format!("unknown feed '{}': use 'live' or 'hero'", other)),
        }
    }
}

/// Everything needed to build one aggregated feed.
#[derive(Debug, Clone)]
pub struct FeedSpec {
    pub kind: FeedKind,
    /// Restrict to one sport; `None` fetches both.
    pub sport: Option<Sport>,
    pub include_local: bool,
    pub interval: Duration,
    pub options: AggregateOptions,
}

impl FeedSpec {
    pub fn for_kind(kind: FeedKind, config: &Config) -> Self {
        let settings = match kind {
            FeedKind::Live => &config.live,
            FeedKind::Hero => &config.hero,
        };
        Self {
            kind,
            sport: None,
            include_local: config.include_local_matches,
            interval: settings.interval,
            options: AggregateOptions {
                cap: settings.cap,
                upcoming_window: settings.upcoming_window,
                filter: FormatFilter {
                    formats: Vec::new(),
                    precedence: config.format_precedence.clone(),
                },
            },
        }
    }

    pub fn with_sport(mut self, sport: Option<Sport>) -> Self {
        self.sport = sport;
        self
    }

    fn feeds(&self, cricket: MatchFeed, football: MatchFeed) -> Vec<MatchFeed> {
        let mut feeds = Vec::with_capacity(2);
        if self.sport != Some(Sport::Football) {
            feeds.push(cricket);
        }
        if self.sport != Some(Sport::Cricket) {
            feeds.push(football);
        }
        feeds
    }
}

/// Running tally of how a multi-source fetch went.
#[derive(Debug, Default)]
struct Settled {
    attempted: usize,
    failed: usize,
    first_error: Option<FetchError>,
}

impl Settled {
    fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }

    fn into_error(self) -> Option<FetchError> {
        self.first_error
    }
}

/// Fetch several feeds concurrently. Each outcome settles on its own: a
/// failing source is logged and contributes nothing, the others are kept.
async fn fetch_settled(
    client: &UpstreamClient,
    feeds: &[MatchFeed],
    settled: &mut Settled,
) -> Vec<(MatchFeed, Vec<Match>)> {
    let mut set = JoinSet::new();
    for (index, feed) in feeds.iter().copied().enumerate() {
        let client = client.clone();
        set.spawn(async move { (index, feed, client.fetch_feed(feed).await) });
    }

    let mut collected = Vec::with_capacity(feeds.len());
    while let Some(joined) = set.join_next().await {
        settled.attempted += 1;
        match joined {
            Ok((index, feed, Ok(matches))) => collected.push((index, feed, matches)),
            Ok((_, feed, Err(e))) => {
                tracing::warn!(feed = feed.label(), error = %e, "upstream fetch failed");
                settled.failed += 1;
                settled.first_error.get_or_insert(e);
            }
            Err(e) => {
                tracing::error!(error = %e, "upstream fetch task aborted");
                settled.failed += 1;
            }
        }
    }

    // Completion order is arbitrary; restore request order so merges are deterministic.
    collected.sort_by_key(|(index, _, _)| *index);
    collected.into_iter().map(|(_, feed, matches)| (feed, matches)).collect()
}

fn flatten(batches: Vec<(MatchFeed, Vec<Match>)>) -> Vec<Match> {
    batches.into_iter().flat_map(|(_, matches)| matches).collect()
}

fn with_status(matches: &[Match], status: MatchStatus) -> Vec<Match> {
    matches.iter().filter(|m| m.status == status).cloned().collect()
}

fn no_data(settled: Settled) -> Result<Aggregate, FetchError> {
    if settled.all_failed() {
        if let Some(e) = settled.into_error() {
            return Err(e);
        }
    }
    Ok(Aggregate::default())
}

/// Build one aggregated feed. Tiers are fetched lazily: results are only
/// requested when nothing is live, fixtures only when there are no results.
pub async fn collect(client: &UpstreamClient, spec: &FeedSpec) -> Result<Aggregate, FetchError> {
    let now = Utc::now();
    let options = &spec.options;
    let mut settled = Settled::default();

    let mut live_feeds = spec.feeds(MatchFeed::CricketLive, MatchFeed::FootballLive);
    if spec.include_local {
        live_feeds.push(MatchFeed::LocalMatches);
    }

    let mut local = Vec::new();
    let mut live = Vec::new();
    for (feed, matches) in fetch_settled(client, &live_feeds, &mut settled).await {
        if feed == MatchFeed::LocalMatches {
            local = matches
                .into_iter()
                .filter(|m| spec.sport.map_or(true, |s| m.sport() == s))
                .collect();
        } else {
            live.extend(matches);
        }
    }
    live.extend(with_status(&local, MatchStatus::Live));

    let agg = aggregator::aggregate(live, Vec::new(), Vec::new(), options, now);
    if agg.tier.is_some() {
        tracing::debug!(feed = spec.kind.as_str(), count = agg.matches.len(), "serving live tier");
        return Ok(agg);
    }

    let results_feeds = spec.feeds(MatchFeed::CricketResults, MatchFeed::FootballResults);
    let mut completed = flatten(fetch_settled(client, &results_feeds, &mut settled).await);
    completed.extend(with_status(&local, MatchStatus::Completed));

    let agg = aggregator::aggregate(Vec::new(), completed, Vec::new(), options, now);
    if agg.tier.is_some() {
        tracing::debug!(feed = spec.kind.as_str(), count = agg.matches.len(), "serving completed tier");
        return Ok(agg);
    }

    let fixture_feeds = spec.feeds(MatchFeed::CricketFixtures, MatchFeed::FootballFixtures);
    let mut upcoming = flatten(fetch_settled(client, &fixture_feeds, &mut settled).await);
    upcoming.extend(with_status(&local, MatchStatus::Upcoming));

    let agg = aggregator::aggregate(Vec::new(), Vec::new(), upcoming, options, now);
    if agg.tier.is_some() {
        tracing::debug!(feed = spec.kind.as_str(), count = agg.matches.len(), "serving upcoming tier");
        return Ok(agg);
    }

    no_data(settled)
}

/// Start polling one aggregated feed on its configured interval.
pub fn spawn_feed(client: &UpstreamClient, spec: FeedSpec) -> PollerHandle<Aggregate> {
    let name = format!("feed:{}", spec.kind.as_str());
    let interval = spec.interval;
    let client = client.clone();
    let spec = Arc::new(spec);

    Poller::new(name, interval, Aggregate::default(), move || {
        let client = client.clone();
        let spec = Arc::clone(&spec);
        async move { collect(&client, &spec).await }
    })
    .spawn()
}

/// Completed matches only, for the results listing.
pub async fn fetch_results(
    client: &UpstreamClient,
    sport: Option<Sport>,
    filter: &FormatFilter,
    limit: usize,
) -> Result<Vec<Match>, FetchError> {
    let mut settled = Settled::default();
    let feeds = match sport {
        Some(Sport::Cricket) => vec![MatchFeed::CricketResults],
        Some(Sport::Football) => vec![MatchFeed::FootballResults],
        None => vec![MatchFeed::CricketResults, MatchFeed::FootballResults],
    };

    let completed = flatten(fetch_settled(client, &feeds, &mut settled).await);
    if settled.all_failed() {
        if let Some(e) = settled.into_error() {
            return Err(e);
        }
    }

    Ok(aggregator::rank_completed(completed, filter)
        .into_iter()
        .take(limit)
        .collect())
}
