use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;

use crate::config::Config;
use crate::models::{Aggregate, CommentaryBuckets, CommentaryEntry, Match, MatchStatus, Sport, Tier};
use crate::services::aggregator::FormatFilter;
use crate::services::feeds::{self, FeedKind, FeedSpec};
use crate::services::{CommentarySource, FeedState, Poller};
use crate::utils::{find_match_by_team, format_score, validate_match_id};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Csv,
    Json,
}

impl std::str::FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportKind::Csv),
            "json" => Ok(ExportKind::Json),
            other => Err(format!("unknown export kind '{}': use 'csv' or 'json'", other)),
        }
    }
}

fn status_icon(status: MatchStatus) -> &'static str {
    match status {
        MatchStatus::Live => "🔴",
        MatchStatus::Completed => "✅",
        MatchStatus::Upcoming => "🗓️",
        MatchStatus::Cancelled => "🚫",
    }
}

fn print_match(index: usize, m: &Match) {
    println!(
        "{}. {} {} vs {} [{}]",
        index + 1,
        status_icon(m.status),
        m.teams.home.name,
        m.teams.away.name,
        m.competition.label()
    );
    println!("   Score: {}", format_score(m));
    if let Some(start) = m.start_time {
        println!("   Starts: {}", start.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(venue) = &m.venue {
        println!("   Venue: {}", venue);
    }
    if let Some(result) = &m.result {
        println!("   Result: {}", result);
    }
    if let (Some(rr), Some(rrr)) = (m.run_rate, m.required_run_rate) {
        println!("   RR: {:.2} | Req RR: {:.2}", rr, rrr);
    } else if let Some(rr) = m.run_rate {
        println!("   RR: {:.2}", rr);
    }
}

fn print_aggregate(title: &str, agg: &Aggregate) {
    let heading = match agg.tier {
        Some(Tier::Live) => "live now",
        Some(Tier::Completed) => "nothing live, latest results",
        Some(Tier::Upcoming) => "nothing live or finished, coming up",
        None => {
            println!("📭 {}: no matches available right now", title);
            return;
        }
    };

    println!("\n🏏 {} ({}):", title, heading);
    for (i, m) in agg.matches.iter().enumerate() {
        print_match(i, m);
    }
}

pub async fn show_feed(config: &Config, kind: FeedKind, sport: Option<Sport>) -> Result<()> {
    let client = config.client()?;
    let spec = FeedSpec::for_kind(kind, config).with_sport(sport);

    println!("📡 Fetching {} feed from {}...", kind.as_str(), client.base_url());
    let agg = feeds::collect(&client, &spec)
        .await
        .with_context(|| format!("failed to build the {} feed", kind.as_str()))?;

    let title = match kind {
        FeedKind::Live => "Live matches",
        FeedKind::Hero => "Featured",
    };
    print_aggregate(title, &agg);
    Ok(())
}

pub async fn show_results(config: &Config, formats: Vec<String>, sport: Option<Sport>, limit: usize) -> Result<()> {
    let client = config.client()?;
    let filter = FormatFilter {
        formats,
        precedence: config.format_precedence.clone(),
    };

    let results = feeds::fetch_results(&client, sport, &filter, limit)
        .await
        .context("failed to fetch results")?;

    if results.is_empty() {
        println!("📭 No completed matches found");
        return Ok(());
    }

    println!("\n🏆 Recent results:");
    for (i, m) in results.iter().enumerate() {
        print_match(i, m);
    }
    Ok(())
}

/// Resolve a match id, either given directly or found in the live feed by team name.
async fn resolve_match_id(config: &Config, match_id: Option<String>, team: Option<String>) -> Result<String> {
    if let Some(id) = match_id {
        if !validate_match_id(&id) {
            bail!("invalid match id '{}'", id);
        }
        return Ok(id);
    }

    let Some(team) = team else {
        bail!("either --match-id or --team is required");
    };

    let client = config.client()?;
    let spec = FeedSpec::for_kind(FeedKind::Live, config).with_sport(Some(Sport::Cricket));
    let agg = feeds::collect(&client, &spec)
        .await
        .context("failed to load the live feed to look up the team")?;

    match find_match_by_team(&agg.matches, &team) {
        Some(m) => {
            println!("🔎 Found {} vs {} ({})", m.teams.home.name, m.teams.away.name, m.id);
            Ok(m.id.clone())
        }
        None => bail!("no current match found for team '{}'", team),
    }
}

fn print_entry(entry: &CommentaryEntry) {
    let wicket = if entry.wickets.unwrap_or(0) > 0 { " 🔻W" } else { "" };
    let players = match (&entry.bowler, &entry.batsman) {
        (Some(bowler), Some(batsman)) => format!(" {} to {},", bowler, batsman),
        _ => String::new(),
    };
    println!(
        "  {}.{}{} {} run(s){} {}",
        entry.over, entry.ball_number, players, entry.runs, wicket, entry.commentary
    );
}

fn print_commentary(buckets: &CommentaryBuckets) {
    if buckets.is_empty() {
        println!("📭 No commentary yet");
        return;
    }
    if buckets.first_innings.is_empty() && buckets.second_innings.is_empty() {
        println!("\n🎙️ Commentary:");
        buckets.all.iter().for_each(print_entry);
        return;
    }
    if !buckets.second_innings.is_empty() {
        println!("\n🎙️ Second innings:");
        buckets.second_innings.iter().for_each(print_entry);
    }
    if !buckets.first_innings.is_empty() {
        println!("\n🎙️ First innings:");
        buckets.first_innings.iter().for_each(print_entry);
    }
}

/// Position of a ball in the match: innings, over, ball.
type BallKey = (u8, u32, u8);

/// Entries newer than `seen`, oldest first, for appending to a running log.
/// Over numbers restart with the second innings, so the innings is part of the key.
fn new_entries(buckets: &CommentaryBuckets, seen: Option<BallKey>) -> Vec<(BallKey, &CommentaryEntry)> {
    fn keyed(innings: u8, entries: &[CommentaryEntry]) -> Vec<(BallKey, &CommentaryEntry)> {
        entries.iter().map(|e| ((innings, e.over, e.ball_number), e)).collect()
    }
    let mut all = if buckets.first_innings.is_empty() && buckets.second_innings.is_empty() {
        keyed(1, &buckets.all)
    } else {
        let mut split = keyed(2, &buckets.second_innings);
        split.extend(keyed(1, &buckets.first_innings));
        split
    };

    all.retain(|(key, _)| seen.map_or(true, |s| *key > s));
    all.reverse();
    all
}

pub async fn show_commentary(
    config: &Config,
    match_id: Option<String>,
    team: Option<String>,
    in_house: bool,
    watch: bool,
) -> Result<()> {
    let match_id = resolve_match_id(config, match_id, team).await?;
    let client = config.client()?;
    let source = if in_house {
        CommentarySource::InHouse
    } else {
        CommentarySource::Feed
    };

    if !watch {
        let header = client.fetch_match(&match_id).await;
        match header {
            Ok(m) => print_match(0, &m),
            Err(e) => tracing::warn!(error = %e, "match header unavailable"),
        }
        let buckets = client
            .fetch_commentary(&match_id, source)
            .await
            .with_context(|| format!("failed to fetch commentary for {}", match_id))?;
        print_commentary(&buckets);
        return Ok(());
    }

    let commentary = {
        let client = client.clone();
        let match_id = match_id.clone();
        Poller::new(
            format!("commentary:{}", match_id),
            config.commentary_interval,
            CommentaryBuckets::default(),
            move || {
                let client = client.clone();
                let match_id = match_id.clone();
                async move { client.fetch_commentary(&match_id, source).await }
            },
        )
        .spawn()
    };
    let header = {
        let client = client.clone();
        let match_id = match_id.clone();
        Poller::new(format!("header:{}", match_id), config.header_interval, None, move || {
            let client = client.clone();
            let match_id = match_id.clone();
            async move { client.fetch_match(&match_id).await.map(Some) }
        })
        .spawn()
    };

    println!("👀 Watching commentary for {} (Ctrl-C to stop)", match_id);
    let mut commentary_rx = commentary.subscribe();
    let mut header_rx = header.subscribe();
    let mut seen: Option<BallKey> = None;

    loop {
        tokio::select! {
            changed = commentary_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = commentary_rx.borrow_and_update().clone();
                if let Some(error) = &state.error {
                    println!("⚠️ {}", error);
                }
                for (key, entry) in new_entries(&state.data, seen) {
                    print_entry(entry);
                    seen = Some(key);
                }
            }
            changed = header_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state: FeedState<Option<Match>> = header_rx.borrow_and_update().clone();
                if let Some(m) = &state.data {
                    println!("📊 {} vs {}: {}", m.teams.home.name, m.teams.away.name, format_score(m));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Stopped watching");
                break;
            }
        }
    }

    Ok(())
}

pub async fn watch_feed(config: &Config, kind: FeedKind) -> Result<()> {
    let client = config.client()?;
    let handle = feeds::spawn_feed(&client, FeedSpec::for_kind(kind, config));
    let mut rx = handle.subscribe();

    println!("👀 Watching the {} feed (Ctrl-C to stop)", kind.as_str());
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if state.loading {
                    continue;
                }
                if let Some(error) = &state.error {
                    println!("⚠️ {}", error);
                }
                if let Some(at) = state.last_updated {
                    println!("\n⏱️ Updated {}", at.format("%H:%M:%S"));
                }
                print_aggregate(handle.name(), &state.data);
            }
            _ = tokio::signal::ctrl_c() => {
                println!("\n👋 Stopped watching");
                break;
            }
        }
    }

    Ok(())
}

pub async fn export_results(
    config: &Config,
    output: &Path,
    kind: ExportKind,
    formats: Vec<String>,
    limit: usize,
) -> Result<()> {
    let client = config.client()?;
    let filter = FormatFilter {
        formats,
        precedence: config.format_precedence.clone(),
    };
    let results = feeds::fetch_results(&client, None, &filter, limit)
        .await
        .context("failed to fetch results for export")?;

    match kind {
        ExportKind::Csv => write_csv(output, &results)?,
        ExportKind::Json => {
            let file = File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
            serde_json::to_writer_pretty(file, &results)?;
        }
    }

    println!("✅ Exported {} matches to {}", results.len(), output.display());
    Ok(())
}

fn write_csv(output: &Path, matches: &[Match]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output).with_context(|| format!("cannot create {}", output.display()))?;
    writer.write_record(["id", "sport", "competition", "home", "away", "status", "start_time", "score", "result"])?;

    for m in matches {
        let status = match m.status {
            MatchStatus::Live => "live",
            MatchStatus::Completed => "completed",
            MatchStatus::Upcoming => "upcoming",
            MatchStatus::Cancelled => "cancelled",
        };
        let start_time = m.start_time.map(|t| t.to_rfc3339()).unwrap_or_default();
        let score = format_score(m);
        writer.write_record([
            m.id.as_str(),
            m.sport().as_str(),
            m.competition.label(),
            m.teams.home.name.as_str(),
            m.teams.away.name.as_str(),
            status,
            start_time.as_str(),
            score.as_str(),
            m.result.as_deref().unwrap_or(""),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
