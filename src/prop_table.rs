use std::cmp::Ordering;

use tracing::{info, warn};

use crate::estimate::{self, PlayerHistory};
use crate::fuzz;
use crate::model::{Direction, MatchConfidence, PropSource, ResolvedProp, display_stat_label};
use crate::publish::{Cell, Table};
use crate::store::ProfileLinks;

pub const RECENT_COLUMNS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Player,
    Team,
    Opponent,
    Type,
    Line,
    Chance,
    Edge,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "player" => Some(SortKey::Player),
            "team" => Some(SortKey::Team),
            "opponent" | "opp" => Some(SortKey::Opponent),
            "type" => Some(SortKey::Type),
            "line" => Some(SortKey::Line),
            "chance" => Some(SortKey::Chance),
            "edge" => Some(SortKey::Edge),
            _ => None,
        }
    }

    pub fn defaults() -> Vec<SortKey> {
        vec![SortKey::Team, SortKey::Opponent, SortKey::Player]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropRow {
    pub player: Option<String>,
    pub team: Option<String>,
    pub opponent: Option<String>,
    pub stat_type: String,
    pub player_id: Option<u64>,
    pub recent: Vec<f64>,
    pub line: Option<f64>,
    pub l10_avg: Option<f64>,
    pub l10_diff: Option<f64>,
    pub l15_avg: Option<f64>,
    pub l15_diff: Option<f64>,
    pub chance: Option<f64>,
    pub edge: Option<f64>,
    pub direction: Option<Direction>,
    pub odd: Option<i32>,
    pub url: Option<String>,
    pub team_url: Option<String>,
    pub opponent_url: Option<String>,
    pub confidence: Option<MatchConfidence>,
}

#[derive(Debug, Clone)]
pub struct PropTable {
    pub source: PropSource,
    pub rows: Vec<PropRow>,
    pub not_found: usize,
}

pub fn build_prop_row(
    prop: &ResolvedProp,
    history: &PlayerHistory,
    profiles: ProfileLinks<'_>,
) -> PropRow {
    let raw = &prop.raw;
    let label = raw.stat_label.as_deref().unwrap_or_default();
    let mut row = PropRow {
        player: raw.player_name.clone(),
        team: raw.team_name.clone(),
        opponent: raw.opponent_name.clone(),
        stat_type: display_stat_label(label),
        player_id: prop.player_id,
        line: raw.line,
        odd: prop.odd,
        confidence: prop.confidence,
        url: prop
            .player_id
            .map(|id| profiles.players.get(&id).cloned().unwrap_or_else(|| id.to_string())),
        team_url: prop.team_id.and_then(|id| profiles.teams.get(&id).cloned()),
        opponent_url: prop.opponent_id.and_then(|id| profiles.teams.get(&id).cloned()),
        ..PropRow::default()
    };

    let Some(est) = estimate::estimate(history, prop.player_id, label, raw.line) else {
        return row;
    };
    row.recent = est.recent().to_vec();
    row.l10_avg = Some(est.l10_avg);
    row.l15_avg = Some(est.l15_avg);
    row.l10_diff = raw.line.map(|line| est.l10_avg - line);
    row.l15_diff = raw.line.map(|line| est.l15_avg - line);
    row.chance = est.probability;
    row.edge = est.edge;
    row.direction = est.direction;
    row
}

/// One row per prop, resolved or not, sorted by `sort_by`.
pub fn build_prop_table(
    source: PropSource,
    props: &[ResolvedProp],
    history: &PlayerHistory,
    profiles: ProfileLinks<'_>,
    sort_by: &[SortKey],
) -> PropTable {
    let mut rows: Vec<PropRow> = props
        .iter()
        .map(|prop| build_prop_row(prop, history, profiles))
        .collect();
    let not_found = rows.iter().filter(|r| r.player_id.is_none()).count();
    sort_rows(&mut rows, sort_by);
    info!("{} props not found on {}", not_found, source.code());
    PropTable {
        source,
        rows,
        not_found,
    }
}

pub fn sort_rows(rows: &mut [PropRow], keys: &[SortKey]) {
    rows.sort_by(|a, b| {
        keys.iter()
            .map(|key| compare_by(a, b, *key))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn compare_by(a: &PropRow, b: &PropRow, key: SortKey) -> Ordering {
    match key {
        SortKey::Player => cmp_text(&a.player, &b.player),
        SortKey::Team => cmp_text(&a.team, &b.team),
        SortKey::Opponent => cmp_text(&a.opponent, &b.opponent),
        SortKey::Type => a.stat_type.cmp(&b.stat_type),
        SortKey::Line => cmp_number(a.line, b.line),
        SortKey::Chance => cmp_number(a.chance, b.chance),
        SortKey::Edge => cmp_number(a.edge, b.edge),
    }
}

fn cmp_text(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ascending with missing values last.
fn cmp_number(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn identity_columns() -> Vec<String> {
    let mut cols = vec![
        "Player".to_string(),
        "Team".to_string(),
        "Opponent".to_string(),
        "Type".to_string(),
    ];
    cols.extend((1..=RECENT_COLUMNS).map(|i| format!("M{i}")));
    cols
}

fn identity_cells(row: &PropRow) -> Vec<Cell> {
    let mut cells = vec![
        Cell::text(row.player.as_deref()),
        Cell::text(row.team.as_deref()),
        Cell::text(row.opponent.as_deref()),
        Cell::Text(row.stat_type.clone()),
    ];
    cells.extend((0..RECENT_COLUMNS).map(|i| Cell::number(row.recent.get(i).copied())));
    cells
}

impl PropTable {
    pub fn columns(&self) -> Vec<String> {
        let mut cols = identity_columns();
        cols.extend(
            [
                self.source.code(),
                "L10 Avg",
                "L10 Diff",
                "L15 Avg",
                "L15 Diff",
                "Chance",
                "Edge +/-",
                "O/U",
                "Odd",
                "URL",
                "Team URL",
                "Opp URL",
                "Match",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        cols
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new(format!("{} Props", self.source.code()), self.columns());
        for row in &self.rows {
            let mut cells = identity_cells(row);
            cells.extend([
                Cell::number(row.line),
                Cell::number(row.l10_avg),
                Cell::number(row.l10_diff),
                Cell::number(row.l15_avg),
                Cell::number(row.l15_diff),
                Cell::number(row.chance),
                Cell::number(row.edge),
                Cell::text(row.direction.map(Direction::tag)),
                Cell::integer(row.odd.map(i64::from)),
                Cell::text(row.url.as_deref()),
                Cell::text(row.team_url.as_deref()),
                Cell::text(row.opponent_url.as_deref()),
                Cell::text(row.confidence.map(MatchConfidence::tag)),
            ]);
            table.push_row(cells);
        }
        table
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossRow {
    /// Identity, recent values, odd and urls come from the first table.
    pub base: PropRow,
    pub line_b: Option<f64>,
    pub chance_b: Option<f64>,
    pub direction_b: Option<Direction>,
    pub line_diff: Option<f64>,
    pub edge: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CrossTable {
    pub source_a: PropSource,
    pub source_b: PropSource,
    pub rows: Vec<CrossRow>,
    /// Extra rows in the second table that also matched an already-matched row.
    pub duplicates: usize,
}

/// Props offered by both sources for the same player, opponent and stat type.
pub fn match_tables(a: &PropTable, b: &PropTable) -> CrossTable {
    let mut team_names: Vec<&str> = Vec::new();
    for name in a
        .rows
        .iter()
        .filter_map(|r| r.team.as_deref())
        .chain(a.rows.iter().filter_map(|r| r.opponent.as_deref()))
    {
        if !team_names.contains(&name) {
            team_names.push(name);
        }
    }

    // Opponent names in `b` mapped onto the spelling used by `a`.
    let b_opponents: Vec<Option<&str>> = b
        .rows
        .iter()
        .map(|r| {
            let opp = r.opponent.as_deref()?;
            fuzz::extract_one(opp, &team_names, 0).map(|c| c.choice)
        })
        .collect();

    let mut rows = Vec::new();
    let mut duplicates = 0usize;
    for ra in &a.rows {
        let (Some(player_id), Some(opponent)) = (ra.player_id, ra.opponent.as_deref()) else {
            continue;
        };
        let mut first: Option<&PropRow> = None;
        for (rb, rb_opponent) in b.rows.iter().zip(&b_opponents) {
            if rb.player_id != Some(player_id) || rb.stat_type != ra.stat_type {
                continue;
            }
            let Some(rb_opponent) = rb_opponent else {
                continue;
            };
            if rb_opponent.trim() != opponent.trim() {
                continue;
            }
            if first.is_none() {
                first = Some(rb);
            } else {
                duplicates += 1;
            }
        }
        let Some(rb) = first else {
            continue;
        };

        let line_diff = match (ra.line, rb.line) {
            (Some(la), Some(lb)) => Some(la - lb),
            _ => None,
        };
        let edge = match (ra.chance, rb.chance) {
            (Some(ca), Some(cb)) => Some((ca + cb) / 2.0 - 0.5),
            _ => None,
        };
        rows.push(CrossRow {
            base: ra.clone(),
            line_b: rb.line,
            chance_b: rb.chance,
            direction_b: rb.direction,
            line_diff,
            edge,
        });
    }

    rows.sort_by(|x, y| cmp_number(x.line_diff, y.line_diff));
    if duplicates > 0 {
        warn!(
            duplicates,
            "{} props matched more than one {} prop; kept the first",
            a.source.code(),
            b.source.code()
        );
    }
    info!(
        "{} matches found of {} & {} props",
        rows.len(),
        a.source.code(),
        b.source.code()
    );

    CrossTable {
        source_a: a.source,
        source_b: b.source,
        rows,
        duplicates,
    }
}

impl CrossTable {
    pub fn columns(&self) -> Vec<String> {
        let a = self.source_a.code();
        let b = self.source_b.code();
        let mut cols = identity_columns();
        cols.extend([
            a.to_string(),
            b.to_string(),
            format!("{a}-{b}"),
            format!("{a} Chance"),
            format!("{a} O/U"),
            format!("{b} Chance"),
            format!("{b} O/U"),
            "Edge +/-".to_string(),
            "Odd".to_string(),
            "URL".to_string(),
            "Team URL".to_string(),
            "Opp URL".to_string(),
        ]);
        cols
    }

    pub fn to_table(&self) -> Table {
        let name = format!("{} vs {}", self.source_a.code(), self.source_b.code());
        let mut table = Table::new(name, self.columns());
        for row in &self.rows {
            let base = &row.base;
            let mut cells = identity_cells(base);
            cells.extend([
                Cell::number(base.line),
                Cell::number(row.line_b),
                Cell::number(row.line_diff),
                Cell::number(base.chance),
                Cell::text(base.direction.map(Direction::tag)),
                Cell::number(row.chance_b),
                Cell::text(row.direction_b.map(Direction::tag)),
                Cell::number(row.edge),
                Cell::integer(base.odd.map(i64::from)),
                Cell::text(base.url.as_deref()),
                Cell::text(base.team_url.as_deref()),
                Cell::text(base.opponent_url.as_deref()),
            ]);
            table.push_row(cells);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(player: &str, team: &str, opp: &str, line: f64) -> PropRow {
        PropRow {
            player: Some(player.to_string()),
            team: Some(team.to_string()),
            opponent: Some(opp.to_string()),
            stat_type: "M1-2 Kills".to_string(),
            player_id: Some(1),
            line: Some(line),
            chance: Some(0.5),
            ..PropRow::default()
        }
    }

    #[test]
    fn sort_puts_missing_values_last() {
        let mut rows = vec![
            PropRow {
                team: None,
                ..row("b", "x", "y", 1.0)
            },
            row("c", "Vitality", "G2", 1.0),
            row("a", "Vitality", "G2", 1.0),
            row("z", "Astralis", "G2", 1.0),
        ];
        sort_rows(&mut rows, &SortKey::defaults());
        let order: Vec<_> = rows.iter().map(|r| r.player.clone().unwrap()).collect();
        assert_eq!(order, vec!["z", "a", "c", "b"]);
    }

    #[test]
    fn duplicate_matches_keep_first_and_are_counted() {
        let a = PropTable {
            source: PropSource::PrizePicks,
            rows: vec![row("ropz", "FaZe", "Vitality", 40.5)],
            not_found: 0,
        };
        let b = PropTable {
            source: PropSource::Underdog,
            rows: vec![row("ropz", "FaZe", "Vitality", 38.5), row("ropz", "FaZe", "Vitality", 42.5)],
            not_found: 0,
        };
        let cross = match_tables(&a, &b);
        assert_eq!(cross.rows.len(), 1);
        assert_eq!(cross.duplicates, 1);
        assert_eq!(cross.rows[0].line_diff, Some(2.0));
        assert_eq!(cross.rows[0].edge, Some(0.0));
    }

    #[test]
    fn columns_follow_source_codes() {
        let table = PropTable {
            source: PropSource::Underdog,
            rows: Vec::new(),
            not_found: 0,
        };
        let cols = table.columns();
        assert_eq!(cols[4], "M1");
        assert_eq!(cols[18], "M15");
        assert_eq!(cols[19], "UD");
        assert_eq!(cols.len(), table.to_table().columns.len());
    }
}
