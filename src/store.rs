use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use serde::Deserialize;

use crate::model::{HistoricalRow, PropSource, StatLine};

const DATA_DIR: &str = "prop_edge";
const DB_FILE: &str = "historical_stats.sqlite";
const DATE_FMT: &str = "%Y-%m-%d";

/// External-source ids mapped onto canonical store ids.
#[derive(Debug, Clone, Default)]
pub struct SourceIdIndex {
    pub players: HashMap<(PropSource, String), u64>,
    pub teams: HashMap<(PropSource, String), u64>,
}

impl SourceIdIndex {
    pub fn player(&self, source: PropSource, external_id: &str) -> Option<u64> {
        self.players
            .get(&(source, external_id.trim().to_string()))
            .copied()
    }

    pub fn team(&self, source: PropSource, external_id: &str) -> Option<u64> {
        self.teams
            .get(&(source, external_id.trim().to_string()))
            .copied()
    }
}

/// Everything the pipeline reads from the store, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct HistoricalStore {
    pub rows: Vec<HistoricalRow>,
    pub source_ids: SourceIdIndex,
    pub player_profiles: HashMap<u64, String>,
    pub team_profiles: HashMap<u64, String>,
}

/// Borrowed profile urls, keyed by canonical player and team id.
#[derive(Debug, Clone, Copy)]
pub struct ProfileLinks<'a> {
    pub players: &'a HashMap<u64, String>,
    pub teams: &'a HashMap<u64, String>,
}

impl HistoricalStore {
    pub fn profile_links(&self) -> ProfileLinks<'_> {
        ProfileLinks {
            players: &self.player_profiles,
            teams: &self.team_profiles,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceIdEntry {
    pub source: PropSource,
    pub external_id: String,
    pub canonical_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileEntry {
    pub id: u64,
    pub url: String,
}

/// Payload accepted by the `hist_import` binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportFile {
    #[serde(default)]
    pub rows: Vec<HistoricalRow>,
    #[serde(default)]
    pub source_players: Vec<SourceIdEntry>,
    #[serde(default)]
    pub source_teams: Vec<SourceIdEntry>,
    #[serde(default)]
    pub player_profiles: Vec<ProfileEntry>,
    #[serde(default)]
    pub team_profiles: Vec<ProfileEntry>,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub rows_upserted: usize,
    pub id_mappings: usize,
    pub profiles: usize,
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_DATA_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(DATA_DIR).join(DB_FILE));
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(DATA_DIR)
            .join(DB_FILE),
    )
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS historical_rows (
            match_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            map_number INTEGER NOT NULL,
            player_name TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            team_name TEXT NOT NULL,
            opponent TEXT NOT NULL,
            map_name TEXT NOT NULL,
            date TEXT NOT NULL,
            kills REAL NOT NULL,
            headshots REAL NOT NULL,
            assists REAL NOT NULL,
            deaths REAL NOT NULL,
            kast REAL NOT NULL,
            adr REAL NOT NULL,
            rating REAL NOT NULL,
            kd_diff REAL NOT NULL,
            fk_diff REAL NOT NULL,
            PRIMARY KEY (match_id, player_id, map_number)
        );
        CREATE INDEX IF NOT EXISTS idx_rows_player ON historical_rows(player_id);
        CREATE INDEX IF NOT EXISTS idx_rows_team ON historical_rows(team_name);

        CREATE TABLE IF NOT EXISTS source_player_ids (
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            PRIMARY KEY (source, external_id)
        );
        CREATE TABLE IF NOT EXISTS source_team_ids (
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            team_id INTEGER NOT NULL,
            PRIMARY KEY (source, external_id)
        );
        CREATE TABLE IF NOT EXISTS player_profiles (
            player_id INTEGER PRIMARY KEY,
            url TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS team_profiles (
            team_id INTEGER PRIMARY KEY,
            url TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS import_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NULL,
            origin TEXT NOT NULL,
            rows_upserted INTEGER NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn load_store(conn: &Connection) -> Result<HistoricalStore> {
    let rows = load_historical_rows(conn)?;
    let source_ids = SourceIdIndex {
        players: load_source_ids(conn, "source_player_ids", "player_id")?,
        teams: load_source_ids(conn, "source_team_ids", "team_id")?,
    };
    Ok(HistoricalStore {
        rows,
        source_ids,
        player_profiles: load_profiles(conn, "player_profiles", "player_id")?,
        team_profiles: load_profiles(conn, "team_profiles", "team_id")?,
    })
}

pub fn load_historical_rows(conn: &Connection) -> Result<Vec<HistoricalRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                match_id, player_id, map_number, player_name, team_id, team_name,
                opponent, map_name, date,
                kills, headshots, assists, deaths, kast, adr, rating, kd_diff, fk_diff
            FROM historical_rows
            ORDER BY date ASC, match_id ASC, map_number ASC, player_id ASC
            "#,
        )
        .context("prepare load rows query")?;

    let rows = stmt
        .query_map([], |row| {
            let date: String = row.get(8)?;
            Ok((
                HistoricalRow {
                    match_id: row.get::<_, u64>(0)?,
                    player_id: row.get::<_, u64>(1)?,
                    map_number: row.get::<_, u8>(2)?,
                    player_name: row.get(3)?,
                    team_id: row.get::<_, u64>(4)?,
                    team_name: row.get(5)?,
                    opponent: row.get(6)?,
                    map_name: row.get(7)?,
                    date: NaiveDate::MIN,
                    stats: StatLine {
                        kills: row.get(9)?,
                        headshots: row.get(10)?,
                        assists: row.get(11)?,
                        deaths: row.get(12)?,
                        kast: row.get(13)?,
                        adr: row.get(14)?,
                        rating: row.get(15)?,
                        kd_diff: row.get(16)?,
                        fk_diff: row.get(17)?,
                    },
                },
                date,
            ))
        })
        .context("query load rows")?;

    let mut out = Vec::new();
    for row in rows {
        let (mut decoded, date) = row.context("decode historical row")?;
        decoded.date = NaiveDate::parse_from_str(date.trim(), DATE_FMT)
            .with_context(|| format!("invalid date {date:?} for match {}", decoded.match_id))?;
        out.push(decoded);
    }
    Ok(out)
}

fn load_source_ids(
    conn: &Connection,
    table: &str,
    id_col: &str,
) -> Result<HashMap<(PropSource, String), u64>> {
    let sql = format!("SELECT source, external_id, {id_col} FROM {table}");
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare {table} query"))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })
        .with_context(|| format!("query {table}"))?;

    let mut out = HashMap::new();
    for row in rows {
        let (source, external_id, id) = row.with_context(|| format!("decode {table} row"))?;
        let Some(source) = PropSource::from_key(&source) else {
            continue;
        };
        out.insert((source, external_id.trim().to_string()), id);
    }
    Ok(out)
}

fn load_profiles(conn: &Connection, table: &str, id_col: &str) -> Result<HashMap<u64, String>> {
    let sql = format!("SELECT {id_col}, url FROM {table}");
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("prepare {table} query"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, u64>(0)?, row.get::<_, String>(1)?)))
        .with_context(|| format!("query {table}"))?;

    let mut out = HashMap::new();
    for row in rows {
        let (id, url) = row.with_context(|| format!("decode {table} row"))?;
        if !url.trim().is_empty() {
            out.insert(id, url);
        }
    }
    Ok(out)
}

pub fn import_file(conn: &mut Connection, origin: &str, file: &ImportFile) -> Result<ImportSummary> {
    if file.rows.is_empty()
        && file.source_players.is_empty()
        && file.source_teams.is_empty()
        && file.player_profiles.is_empty()
        && file.team_profiles.is_empty()
    {
        return Err(anyhow!("import file {origin} has nothing to import"));
    }

    conn.execute(
        "INSERT INTO import_runs(started_at, finished_at, origin, rows_upserted)
         VALUES (?1, NULL, ?2, 0)",
        params![Utc::now().to_rfc3339(), origin],
    )
    .context("insert import run")?;
    let run_id = conn.last_insert_rowid();

    let tx = conn.transaction().context("begin import transaction")?;
    for row in &file.rows {
        upsert_row(&tx, row)?;
    }
    for entry in &file.source_players {
        upsert_source_id(&tx, "source_player_ids", "player_id", entry)?;
    }
    for entry in &file.source_teams {
        upsert_source_id(&tx, "source_team_ids", "team_id", entry)?;
    }
    for entry in &file.player_profiles {
        upsert_profile(&tx, "player_profiles", "player_id", entry)?;
    }
    for entry in &file.team_profiles {
        upsert_profile(&tx, "team_profiles", "team_id", entry)?;
    }
    tx.commit().context("commit import transaction")?;

    conn.execute(
        "UPDATE import_runs SET finished_at = ?1, rows_upserted = ?2 WHERE run_id = ?3",
        params![Utc::now().to_rfc3339(), file.rows.len() as i64, run_id],
    )
    .context("update import run")?;

    Ok(ImportSummary {
        rows_upserted: file.rows.len(),
        id_mappings: file.source_players.len() + file.source_teams.len(),
        profiles: file.player_profiles.len() + file.team_profiles.len(),
    })
}

fn upsert_row(tx: &rusqlite::Transaction<'_>, r: &HistoricalRow) -> Result<()> {
    tx.execute(
        r#"
        INSERT INTO historical_rows (
            match_id, player_id, map_number, player_name, team_id, team_name,
            opponent, map_name, date,
            kills, headshots, assists, deaths, kast, adr, rating, kd_diff, fk_diff
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9,
            ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18
        )
        ON CONFLICT(match_id, player_id, map_number) DO UPDATE SET
            player_name = excluded.player_name,
            team_id = excluded.team_id,
            team_name = excluded.team_name,
            opponent = excluded.opponent,
            map_name = excluded.map_name,
            date = excluded.date,
            kills = excluded.kills,
            headshots = excluded.headshots,
            assists = excluded.assists,
            deaths = excluded.deaths,
            kast = excluded.kast,
            adr = excluded.adr,
            rating = excluded.rating,
            kd_diff = excluded.kd_diff,
            fk_diff = excluded.fk_diff
        "#,
        params![
            r.match_id as i64,
            r.player_id as i64,
            r.map_number as i64,
            r.player_name,
            r.team_id as i64,
            r.team_name,
            r.opponent,
            r.map_name,
            r.date.format(DATE_FMT).to_string(),
            r.stats.kills,
            r.stats.headshots,
            r.stats.assists,
            r.stats.deaths,
            r.stats.kast,
            r.stats.adr,
            r.stats.rating,
            r.stats.kd_diff,
            r.stats.fk_diff,
        ],
    )
    .with_context(|| {
        format!(
            "upsert row match={} player={} map={}",
            r.match_id, r.player_id, r.map_number
        )
    })?;
    Ok(())
}

fn upsert_source_id(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    id_col: &str,
    entry: &SourceIdEntry,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} (source, external_id, {id_col}) VALUES (?1, ?2, ?3)
         ON CONFLICT(source, external_id) DO UPDATE SET {id_col} = excluded.{id_col}"
    );
    tx.execute(
        &sql,
        params![
            entry.source.key(),
            entry.external_id.trim(),
            entry.canonical_id as i64
        ],
    )
    .with_context(|| format!("upsert {table}"))?;
    Ok(())
}

fn upsert_profile(
    tx: &rusqlite::Transaction<'_>,
    table: &str,
    id_col: &str,
    entry: &ProfileEntry,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} ({id_col}, url) VALUES (?1, ?2)
         ON CONFLICT({id_col}) DO UPDATE SET url = excluded.url"
    );
    tx.execute(&sql, params![entry.id as i64, entry.url])
        .with_context(|| format!("upsert {table}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(map_number: u8, kills: f64) -> HistoricalRow {
        HistoricalRow {
            match_id: 100,
            player_id: 7,
            player_name: "NAF".to_string(),
            team_id: 5973,
            team_name: "Liquid".to_string(),
            opponent: "FaZe".to_string(),
            map_number,
            map_name: "Nuke".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            stats: StatLine {
                kills,
                ..StatLine::default()
            },
        }
    }

    #[test]
    fn import_then_load_roundtrips_rows_and_lookups() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let file = ImportFile {
            rows: vec![sample_row(1, 21.0), sample_row(2, 17.0)],
            source_players: vec![SourceIdEntry {
                source: PropSource::PrizePicks,
                external_id: " 9001 ".to_string(),
                canonical_id: 7,
            }],
            player_profiles: vec![ProfileEntry {
                id: 7,
                url: "https://www.hltv.org/player/8520/naf".to_string(),
            }],
            ..ImportFile::default()
        };
        let summary = import_file(&mut conn, "test", &file).unwrap();
        assert_eq!(summary.rows_upserted, 2);

        // Re-importing a row updates it in place.
        let update = ImportFile {
            rows: vec![sample_row(2, 30.0)],
            ..ImportFile::default()
        };
        import_file(&mut conn, "test", &update).unwrap();

        let store = load_store(&conn).unwrap();
        assert_eq!(store.rows.len(), 2);
        assert_eq!(store.rows[1].stats.kills, 30.0);
        assert_eq!(store.rows[0].date, NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(store.source_ids.player(PropSource::PrizePicks, "9001"), Some(7));
        assert_eq!(store.source_ids.player(PropSource::Underdog, "9001"), None);
        assert!(store.player_profiles.contains_key(&7));
    }

    #[test]
    fn empty_import_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        assert!(import_file(&mut conn, "empty", &ImportFile::default()).is_err());
    }
}
