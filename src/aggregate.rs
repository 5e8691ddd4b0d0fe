use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::model::{HistoricalRow, MapRange, StatLine};

/// Pseudo-maps some stat pages emit for series totals.
const SUMMARY_MAP_NAMES: &[&str] = &["all", "best of 2", "best of 3"];

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRow {
    pub match_id: u64,
    pub player_id: u64,
    pub player_name: String,
    pub team_id: u64,
    pub team_name: String,
    pub opponent: String,
    pub date: NaiveDate,
    pub range: MapRange,
    /// Number of per-map rows folded into this one.
    pub maps: u8,
    pub stats: StatLine,
}

impl AggregatedRow {
    fn from_maps(range: MapRange, rows: &[&HistoricalRow]) -> Option<Self> {
        let first = rows.first()?;
        let stats = StatLine::combine(&rows.iter().map(|r| &r.stats).collect::<Vec<_>>())?;
        Some(Self {
            match_id: first.match_id,
            player_id: first.player_id,
            player_name: first.player_name.clone(),
            team_id: first.team_id,
            team_name: first.team_name.clone(),
            opponent: first.opponent.clone(),
            date: first.date,
            range,
            maps: rows.len() as u8,
            stats,
        })
    }
}

pub fn is_summary_map(name: &str) -> bool {
    let n = name.trim().to_ascii_lowercase();
    SUMMARY_MAP_NAMES.contains(&n.as_str())
}

/// Single-map rows relabelled by range, plus combined 1-2 and 1-3 rows.
///
/// Matches whose map numbers fall outside {1, 2, 3} are dropped entirely; a match
/// missing map 3 only loses its 1-3 rows.
pub fn aggregate_rows(rows: &[HistoricalRow]) -> Vec<AggregatedRow> {
    let mut by_match: BTreeMap<u64, Vec<&HistoricalRow>> = BTreeMap::new();
    for row in rows {
        if is_summary_map(&row.map_name) {
            continue;
        }
        by_match.entry(row.match_id).or_default().push(row);
    }

    let mut out = Vec::new();
    for match_rows in by_match.values() {
        if !match_rows.iter().all(|r| (1..=3).contains(&r.map_number)) {
            continue;
        }

        let mut players: Vec<u64> = Vec::new();
        let mut maps_by_player: HashMap<u64, [Option<&HistoricalRow>; 3]> = HashMap::new();
        for row in match_rows {
            let slots = maps_by_player.entry(row.player_id).or_insert_with(|| {
                players.push(row.player_id);
                [None; 3]
            });
            let slot = &mut slots[(row.map_number - 1) as usize];
            if slot.is_none() {
                *slot = Some(row);
            }
        }

        for player_id in &players {
            let Some(slots) = maps_by_player.get(player_id) else {
                continue;
            };
            for (idx, range) in [MapRange::Map1, MapRange::Map2, MapRange::Map3]
                .into_iter()
                .enumerate()
            {
                if let Some(row) = slots[idx]
                    && let Some(agg) = AggregatedRow::from_maps(range, &[row])
                {
                    out.push(agg);
                }
            }
            if let [Some(m1), Some(m2), m3] = *slots {
                if let Some(agg) = AggregatedRow::from_maps(MapRange::Maps1To2, &[m1, m2]) {
                    out.push(agg);
                }
                if let Some(m3) = m3
                    && let Some(agg) = AggregatedRow::from_maps(MapRange::Maps1To3, &[m1, m2, m3])
                {
                    out.push(agg);
                }
            }
        }
    }
    out
}
