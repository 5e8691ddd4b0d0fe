use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use prop_edge::bovado_fetch::parse_bovado_json;
use prop_edge::config::PipelineConfig;
use prop_edge::model::{Direction, PropSource};
use prop_edge::pipeline::{
    FetchedSources, Feed, LAST_UPDATE_TABLE, SourceFailure, build_output, publish_output,
};
use prop_edge::prizepicks_fetch::parse_prizepicks_json;
use prop_edge::prop_table::SortKey;
use prop_edge::publish::{Cell, Table, TableSink};
use prop_edge::resolver::RiskyMatchPolicy;
use prop_edge::store::{self, HistoricalStore, ImportFile};
use prop_edge::underdog_fetch::{parse_underdog_json, parse_underdog_teams_json};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn fixture_store() -> HistoricalStore {
    let mut conn = Connection::open_in_memory().expect("in-memory db");
    store::init_schema(&conn).expect("schema");
    let file: ImportFile =
        serde_json::from_str(&read_fixture("historical.json")).expect("historical fixture");
    store::import_file(&mut conn, "historical.json", &file).expect("import");
    store::load_store(&conn).expect("load store")
}

fn config() -> PipelineConfig {
    PipelineConfig {
        db_path: None,
        output_path: PathBuf::from("unused.xlsx"),
        prizepicks_league_id: "265".to_string(),
        prizepicks_enabled: true,
        underdog_enabled: true,
        bovado_enabled: true,
        fetch_timeout: Duration::from_secs(10),
        fetch_parallelism: 3,
        risky_match_policy: RiskyMatchPolicy::Trust,
        sort_by: SortKey::defaults(),
    }
}

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).expect("epoch")
}

fn fetched_fixtures() -> FetchedSources {
    let teams = parse_underdog_teams_json(&read_fixture("underdog_teams.json")).expect("teams");
    FetchedSources {
        prizepicks: Some(
            parse_prizepicks_json(&read_fixture("prizepicks_projections.json")).expect("pp"),
        ),
        underdog: Some(
            parse_underdog_json(&read_fixture("underdog_lines.json"), &teams).expect("ud"),
        ),
        odds: Some(parse_bovado_json(&read_fixture("bovado_events.json")).expect("odds")),
        failures: Vec::new(),
    }
}

#[derive(Default)]
struct MemorySink {
    tables: Vec<Table>,
    finished: bool,
}

impl TableSink for MemorySink {
    fn publish(&mut self, table: &Table) -> Result<()> {
        self.tables.push(table.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

struct FailingSink;

impl TableSink for FailingSink {
    fn publish(&mut self, _table: &Table) -> Result<()> {
        Err(anyhow!("disk full"))
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

fn text<'a>(table: &'a Table, row: usize, column: &str) -> Option<&'a str> {
    table.cell(row, column).and_then(Cell::as_text)
}

fn number(table: &Table, row: usize, column: &str) -> Option<f64> {
    table.cell(row, column).and_then(Cell::as_number)
}

#[test]
fn per_source_rows_carry_estimates() {
    let store = fixture_store();
    let output = build_output(&store, fetched_fixtures(), &config(), epoch());
    assert_eq!(output.prop_tables.len(), 2);

    let pp = &output.prop_tables[0];
    assert_eq!(pp.source, PropSource::PrizePicks);
    assert_eq!(pp.rows.len(), 4);
    assert_eq!(pp.not_found, 2);

    let twistzz = pp
        .rows
        .iter()
        .find(|r| r.player.as_deref() == Some("Twistzz"))
        .expect("twistzz row");
    assert_eq!(twistzz.stat_type, "M1-2 Kills");
    assert_eq!(twistzz.recent, vec![35.0, 38.0]);
    assert_eq!(twistzz.l10_avg, Some(36.5));
    assert_eq!(twistzz.l10_diff, Some(2.0));
    assert_eq!(twistzz.chance, Some(1.0));
    assert_eq!(twistzz.edge, Some(0.5));
    assert_eq!(twistzz.direction, Some(Direction::Over));
    assert_eq!(twistzz.odd, Some(120));
    assert_eq!(
        twistzz.url.as_deref(),
        Some("https://www.hltv.org/player/8797/twistzz")
    );
    assert_eq!(
        twistzz.team_url.as_deref(),
        Some("https://www.hltv.org/team/5973/liquid")
    );
    assert!(twistzz.opponent_url.is_none());

    let ropz = pp
        .rows
        .iter()
        .find(|r| r.player.as_deref() == Some("ropz"))
        .expect("ropz row");
    // The match with a fourth map is left out of the history.
    assert_eq!(ropz.recent, vec![39.0, 41.0]);
    assert_eq!(ropz.direction, Some(Direction::Neutral));
    assert_eq!(ropz.url.as_deref(), Some("200"));
    assert!(ropz.team_url.is_none());
    assert_eq!(
        ropz.opponent_url.as_deref(),
        Some("https://www.hltv.org/team/5973/liquid")
    );
}

#[test]
fn unresolved_props_keep_rows_and_sort_last() {
    let store = fixture_store();
    let output = build_output(&store, fetched_fixtures(), &config(), epoch());
    let pp = &output.prop_tables[0];

    let teams: Vec<Option<&str>> = pp.rows.iter().map(|r| r.team.as_deref()).collect();
    assert_eq!(
        teams,
        vec![Some("FaZe"), Some("Falcons"), Some("Team Liquid"), None]
    );
    let s1mple = &pp.rows[1];
    assert!(s1mple.player_id.is_none());
    assert!(s1mple.recent.is_empty());
    assert!(s1mple.chance.is_none());
    assert_eq!(s1mple.stat_type, "M3 Hs");
}

#[test]
fn underdog_ropz_resolves_through_source_id() {
    let store = fixture_store();
    let output = build_output(&store, fetched_fixtures(), &config(), epoch());
    let ud = &output.prop_tables[1];
    assert_eq!(ud.source, PropSource::Underdog);
    assert_eq!(ud.not_found, 0);

    let table = ud.to_table();
    let ropz_row = (0..table.rows.len())
        .find(|&i| text(&table, i, "Player") == Some("ropz"))
        .expect("ropz row");
    assert_eq!(text(&table, ropz_row, "Match"), Some("id"));
    assert_eq!(number(&table, ropz_row, "UD"), Some(40.5));
}

#[test]
fn cross_source_rows_pair_the_same_prop() {
    let store = fixture_store();
    let output = build_output(&store, fetched_fixtures(), &config(), epoch());
    let cross = output.cross.as_ref().expect("both sources present");
    assert_eq!(cross.rows.len(), 2);
    assert_eq!(cross.duplicates, 0);

    let first = &cross.rows[0];
    assert_eq!(first.base.player.as_deref(), Some("Twistzz"));
    assert_eq!(first.line_diff, Some(-3.0));
    assert_eq!(first.edge, Some(0.25));
    assert_eq!(first.chance_b, Some(0.5));

    let second = &cross.rows[1];
    assert_eq!(second.base.player.as_deref(), Some("ropz"));
    assert_eq!(second.line_diff, Some(0.0));

    let table = cross.to_table();
    assert_eq!(table.name, "PP vs UD");
    assert_eq!(number(&table, 0, "PP-UD"), Some(-3.0));
    assert_eq!(text(&table, 0, "PP O/U"), Some("O"));
    assert_eq!(text(&table, 0, "UD O/U"), Some("N"));
    assert_eq!(
        text(&table, 0, "Team URL"),
        Some("https://www.hltv.org/team/5973/liquid")
    );
    assert_eq!(text(&table, 1, "Opp URL"), Some("https://www.hltv.org/team/5973/liquid"));
}

#[test]
fn publishing_writes_every_table_in_order() {
    let store = fixture_store();
    let mut output = build_output(&store, fetched_fixtures(), &config(), epoch());
    let mut sink = MemorySink::default();
    publish_output(&mut output, &mut sink).expect("publish");

    assert!(sink.finished);
    let names: Vec<&str> = sink.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["PP Props", "UD Props", "PP vs UD", LAST_UPDATE_TABLE]);
    assert_eq!(output.report.tables.len(), 4);

    let stamp = &sink.tables[3];
    assert_eq!(text(stamp, 0, "Status"), Some("ok"));
    assert_eq!(number(stamp, 0, "Props"), Some(4.0));
    assert_eq!(number(stamp, 2, "Props"), Some(2.0));
    assert_eq!(text(stamp, 2, "Updated (UTC)"), Some("1970-01-01 00:00:00"));
}

#[test]
fn failed_source_is_reported_and_others_still_publish() {
    let store = fixture_store();
    let mut fetched = fetched_fixtures();
    fetched.underdog = None;
    fetched.failures.push(SourceFailure {
        feed: Feed::Underdog,
        kind: "status",
        message: "http 503 Service Unavailable: upstream down".to_string(),
    });

    let mut output = build_output(&store, fetched, &config(), epoch());
    assert_eq!(output.prop_tables.len(), 1);
    assert!(output.cross.is_none());
    assert_eq!(output.report.failures.len(), 1);

    let mut sink = MemorySink::default();
    publish_output(&mut output, &mut sink).expect("publish");
    let names: Vec<&str> = sink.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["PP Props", LAST_UPDATE_TABLE]);
    assert_eq!(text(&sink.tables[1], 1, "Status"), Some("failed (status)"));
}

#[test]
fn sink_failure_aborts_publishing() {
    let store = fixture_store();
    let mut output = build_output(&store, fetched_fixtures(), &config(), epoch());
    let err = publish_output(&mut output, &mut FailingSink).expect_err("sink error");
    assert!(format!("{err:#}").contains("disk full"));
    assert!(output.report.tables.is_empty());
}

#[test]
fn empty_store_leaves_everything_unresolved() {
    let output = build_output(
        &HistoricalStore::default(),
        fetched_fixtures(),
        &config(),
        epoch(),
    );
    for table in &output.prop_tables {
        assert_eq!(table.not_found, table.rows.len());
        assert!(table.rows.iter().all(|r| r.chance.is_none()));
    }
    assert!(output.cross.as_ref().is_some_and(|c| c.rows.is_empty()));
}
