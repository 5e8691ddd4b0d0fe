use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use tracing::{info, warn};

use crate::aggregate::aggregate_rows;
use crate::bovado_fetch::fetch_bovado;
use crate::config::PipelineConfig;
use crate::estimate::PlayerHistory;
use crate::http_client::FetchError;
use crate::model::{MatchupOdd, PropSource, RawProp, ResolvedProp};
use crate::prizepicks_fetch::fetch_prizepicks;
use crate::prop_table::{CrossTable, PropTable, build_prop_table, match_tables};
use crate::publish::{Cell, Table, TableSink};
use crate::resolver::{ResolutionSummary, Resolver, ResolverConfig, Roster, log_summary};
use crate::store::HistoricalStore;
use crate::underdog_fetch::fetch_underdog;

pub const LAST_UPDATE_TABLE: &str = "Last Update";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    PrizePicks,
    Underdog,
    Bovado,
}

impl Feed {
    pub fn name(self) -> &'static str {
        match self {
            Feed::PrizePicks => "prizepicks",
            Feed::Underdog => "underdog",
            Feed::Bovado => "bovado",
        }
    }
}

impl From<PropSource> for Feed {
    fn from(source: PropSource) -> Self {
        match source {
            PropSource::PrizePicks => Feed::PrizePicks,
            PropSource::Underdog => Feed::Underdog,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub feed: Feed,
    /// `transport`, `status`, `decode` or `other`.
    pub kind: &'static str,
    pub message: String,
}

impl SourceFailure {
    pub fn from_error(feed: Feed, err: &anyhow::Error) -> Self {
        let kind = err
            .downcast_ref::<FetchError>()
            .map(FetchError::kind)
            .unwrap_or("other");
        Self {
            feed,
            kind,
            message: format!("{err:#}"),
        }
    }
}

/// Upstream payloads for one run. A feed that is disabled or failed is `None`;
/// failures are listed separately.
#[derive(Debug, Clone, Default)]
pub struct FetchedSources {
    pub prizepicks: Option<Vec<RawProp>>,
    pub underdog: Option<Vec<RawProp>>,
    pub odds: Option<Vec<MatchupOdd>>,
    pub failures: Vec<SourceFailure>,
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

fn fetch_if<T>(enabled: bool, fetch: impl FnOnce() -> Result<T>) -> Option<Result<T>> {
    enabled.then(fetch)
}

/// Fetch every enabled feed concurrently. Never fails; a feed error becomes a
/// [`SourceFailure`] and the other feeds are kept.
pub fn fetch_all(client: &Client, cfg: &PipelineConfig) -> FetchedSources {
    let pool = build_fetch_pool(cfg.fetch_parallelism);
    let ((prizepicks, underdog), odds) = with_fetch_pool(&pool, || {
        rayon::join(
            || {
                rayon::join(
                    || {
                        fetch_if(cfg.prizepicks_enabled, || {
                            fetch_prizepicks(client, &cfg.prizepicks_league_id)
                        })
                    },
                    || fetch_if(cfg.underdog_enabled, || fetch_underdog(client)),
                )
            },
            || fetch_if(cfg.bovado_enabled, || fetch_bovado(client)),
        )
    });

    let mut failures = Vec::new();
    FetchedSources {
        prizepicks: settle(Feed::PrizePicks, prizepicks, &mut failures),
        underdog: settle(Feed::Underdog, underdog, &mut failures),
        odds: settle(Feed::Bovado, odds, &mut failures),
        failures,
    }
}

fn settle<T>(
    feed: Feed,
    outcome: Option<Result<Vec<T>>>,
    failures: &mut Vec<SourceFailure>,
) -> Option<Vec<T>> {
    match outcome? {
        Ok(items) => {
            info!(feed = feed.name(), count = items.len(), "fetched");
            Some(items)
        }
        Err(err) => {
            let failure = SourceFailure::from_error(feed, &err);
            warn!(feed = feed.name(), kind = failure.kind, "fetch failed: {}", failure.message);
            failures.push(failure);
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: PropSource,
    pub summary: ResolutionSummary,
    pub not_found: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub updated_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub failures: Vec<SourceFailure>,
    /// `None` when no odds were fetched.
    pub odds_events: Option<usize>,
    pub cross_rows: usize,
    pub cross_duplicates: usize,
    pub tables: Vec<String>,
}

/// Everything derived from one fetch, ready to publish.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub prop_tables: Vec<PropTable>,
    pub cross: Option<CrossTable>,
    pub report: RunReport,
}

impl PipelineOutput {
    /// Per-source tables, then the cross-source table, then the run stamp.
    pub fn tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.prop_tables.iter().map(PropTable::to_table).collect();
        if let Some(cross) = &self.cross {
            tables.push(cross.to_table());
        }
        tables.push(last_update_table(&self.report));
        tables
    }
}

/// Resolve, estimate and tabulate fetched props against the loaded store.
pub fn build_output(
    store: &HistoricalStore,
    fetched: FetchedSources,
    cfg: &PipelineConfig,
    updated_at: DateTime<Utc>,
) -> PipelineOutput {
    let history = PlayerHistory::new(aggregate_rows(&store.rows));
    let roster = Roster::from_rows(&store.rows);
    let resolver = Resolver::new(
        &roster,
        ResolverConfig {
            risky_policy: cfg.risky_match_policy,
            ..ResolverConfig::default()
        },
    )
    .with_source_ids(&store.source_ids);
    info!(
        rows = store.rows.len(),
        players = history.players(),
        teams = roster.teams().len(),
        "historical store ready"
    );

    let odds_events = fetched.odds.as_ref().map(Vec::len);
    let odds = fetched.odds.unwrap_or_default();
    let mut prop_tables = Vec::new();
    let mut sources = Vec::new();
    for (source, raw) in [
        (PropSource::PrizePicks, fetched.prizepicks),
        (PropSource::Underdog, fetched.underdog),
    ] {
        let Some(raw) = raw else {
            continue;
        };
        let mut props: Vec<ResolvedProp> = raw.into_iter().map(ResolvedProp::from).collect();
        let mut summary = resolver.resolve(&mut props);
        summary.odds_attached = resolver.attach_odds(&mut props, &odds);
        log_summary(source, &summary);

        let table = build_prop_table(
            source,
            &props,
            &history,
            store.profile_links(),
            &cfg.sort_by,
        );
        sources.push(SourceReport {
            source,
            summary,
            not_found: table.not_found,
        });
        prop_tables.push(table);
    }

    let cross = match prop_tables.as_slice() {
        [a, b] => Some(match_tables(a, b)),
        _ => None,
    };

    let report = RunReport {
        updated_at,
        sources,
        failures: fetched.failures,
        odds_events,
        cross_rows: cross.as_ref().map_or(0, |c| c.rows.len()),
        cross_duplicates: cross.as_ref().map_or(0, |c| c.duplicates),
        tables: Vec::new(),
    };
    PipelineOutput {
        prop_tables,
        cross,
        report,
    }
}

/// Publish every table and flush the sink. Stops at the first sink error.
pub fn publish_output(output: &mut PipelineOutput, sink: &mut dyn TableSink) -> Result<()> {
    for table in output.tables() {
        sink.publish(&table)
            .with_context(|| format!("publish table {}", table.name))?;
        output.report.tables.push(table.name);
    }
    sink.finish().context("finish publishing")?;
    Ok(())
}

/// One full run: fetch, resolve, estimate and publish. Feed failures are
/// reported, only sink failures abort.
pub fn run(
    store: &HistoricalStore,
    client: &Client,
    cfg: &PipelineConfig,
    sink: &mut dyn TableSink,
) -> Result<RunReport> {
    let fetched = fetch_all(client, cfg);
    let mut output = build_output(store, fetched, cfg, Utc::now());
    publish_output(&mut output, sink)?;
    Ok(output.report)
}

fn last_update_table(report: &RunReport) -> Table {
    let columns = ["Source", "Status", "Props", "Located", "Risky", "Updated (UTC)"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let mut table = Table::new(LAST_UPDATE_TABLE, columns);
    let stamp = report.updated_at.format("%Y-%m-%d %H:%M:%S").to_string();

    for feed in [Feed::PrizePicks, Feed::Underdog, Feed::Bovado] {
        let failure = report.failures.iter().find(|f| f.feed == feed);
        let source = report
            .sources
            .iter()
            .find(|s| Feed::from(s.source) == feed);
        let status = match (failure, source) {
            (Some(f), _) => format!("failed ({})", f.kind),
            (None, Some(_)) => "ok".to_string(),
            (None, None) if feed == Feed::Bovado && report.odds_events.is_some() => {
                "ok".to_string()
            }
            (None, None) => "skipped".to_string(),
        };
        let (props, located, risky) = match source {
            Some(s) => (
                Cell::Integer(s.summary.total as i64),
                Cell::Integer(s.summary.located() as i64),
                Cell::Integer(s.summary.risky as i64),
            ),
            None if feed == Feed::Bovado => (
                Cell::integer(report.odds_events.map(|n| n as i64)),
                Cell::Empty,
                Cell::Empty,
            ),
            None => (Cell::Empty, Cell::Empty, Cell::Empty),
        };
        table.push_row(vec![
            Cell::Text(feed.name().to_string()),
            Cell::Text(status),
            props,
            located,
            risky,
            Cell::Text(stamp.clone()),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            updated_at: DateTime::from_timestamp(1_709_294_400, 0).unwrap(),
            sources: vec![SourceReport {
                source: PropSource::PrizePicks,
                summary: ResolutionSummary {
                    total: 4,
                    unresolved: 1,
                    risky: 1,
                    ..ResolutionSummary::default()
                },
                not_found: 1,
            }],
            failures: vec![SourceFailure {
                feed: Feed::Underdog,
                kind: "status",
                message: "http 503".to_string(),
            }],
            odds_events: None,
            cross_rows: 0,
            cross_duplicates: 0,
            tables: Vec::new(),
        }
    }

    #[test]
    fn last_update_lists_every_feed() {
        let table = last_update_table(&report());
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.cell(0, "Status").and_then(Cell::as_text), Some("ok"));
        assert_eq!(table.cell(0, "Located").and_then(Cell::as_number), Some(3.0));
        assert_eq!(table.cell(1, "Status").and_then(Cell::as_text), Some("failed (status)"));
        assert_eq!(table.cell(2, "Status").and_then(Cell::as_text), Some("skipped"));
        assert_eq!(
            table.cell(2, "Updated (UTC)").and_then(Cell::as_text),
            Some("2024-03-01 12:00:00")
        );
    }

    #[test]
    fn failures_are_classified_by_fetch_error() {
        let err: anyhow::Error = FetchError::Decode("bad".to_string()).into();
        assert_eq!(SourceFailure::from_error(Feed::Bovado, &err).kind, "decode");
        let err = anyhow::anyhow!("boom");
        assert_eq!(SourceFailure::from_error(Feed::Bovado, &err).kind, "other");
    }

    #[test]
    fn disabled_feeds_are_not_fetched() {
        let cfg = PipelineConfig {
            prizepicks_enabled: false,
            underdog_enabled: false,
            bovado_enabled: false,
            ..PipelineConfig::from_env()
        };
        let client = Client::new();
        let fetched = fetch_all(&client, &cfg);
        assert!(fetched.prizepicks.is_none());
        assert!(fetched.odds.is_none());
        assert!(fetched.failures.is_empty());
    }
}
