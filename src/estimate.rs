use std::collections::HashMap;

use crate::aggregate::AggregatedRow;
use crate::model::{Direction, StatType};

pub const L10: usize = 10;
pub const L15: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityEstimate {
    /// Every value on record, most recent first.
    pub values: Vec<f64>,
    pub l10_count: usize,
    pub l15_count: usize,
    pub l10_avg: f64,
    pub l15_avg: f64,
    pub probability: Option<f64>,
    pub edge: Option<f64>,
    pub direction: Option<Direction>,
}

impl ProbabilityEstimate {
    pub fn recent(&self) -> &[f64] {
        &self.values[..self.l15_count]
    }
}

/// Aggregated rows indexed by player, newest match first.
#[derive(Debug, Clone, Default)]
pub struct PlayerHistory {
    by_player: HashMap<u64, Vec<AggregatedRow>>,
}

impl PlayerHistory {
    pub fn new(rows: Vec<AggregatedRow>) -> Self {
        let mut by_player: HashMap<u64, Vec<AggregatedRow>> = HashMap::new();
        for row in rows {
            by_player.entry(row.player_id).or_default().push(row);
        }
        for rows in by_player.values_mut() {
            rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.match_id.cmp(&a.match_id)));
        }
        Self { by_player }
    }

    pub fn players(&self) -> usize {
        self.by_player.len()
    }

    /// Per-match values of one stat over one map range. Only matches where the
    /// player played every map of the range count.
    pub fn values(&self, player_id: u64, stat_type: &StatType) -> Vec<f64> {
        let Some(rows) = self.by_player.get(&player_id) else {
            return Vec::new();
        };
        rows.iter()
            .filter(|r| r.range == stat_type.range)
            .filter(|r| usize::from(r.maps) == stat_type.range.cardinality())
            .map(|r| r.stats.get(stat_type.stat))
            .collect()
    }

    /// Same as [`PlayerHistory::values`] for a raw label; unknown labels give nothing.
    pub fn values_for_label(&self, player_id: u64, label: &str) -> Vec<f64> {
        match StatType::parse(label) {
            Some(stat_type) => self.values(player_id, &stat_type),
            None => Vec::new(),
        }
    }
}

pub fn window_mean(values: &[f64], window: usize) -> f64 {
    let slice = &values[..values.len().min(window)];
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().sum::<f64>() / slice.len() as f64
}

/// Share of values at or above the line, with edge against a coin flip.
pub fn probability(values: &[f64], line: f64) -> Option<(f64, f64, Direction)> {
    if values.is_empty() {
        return None;
    }
    let hits = values.iter().filter(|v| **v >= line).count();
    let p = hits as f64 / values.len() as f64;
    let edge = p - 0.5;
    Some((p, edge, Direction::from_edge(edge)))
}

pub fn estimate_values(values: Vec<f64>, line: Option<f64>) -> Option<ProbabilityEstimate> {
    if values.is_empty() {
        return None;
    }
    let scored = line.and_then(|line| probability(&values, line));
    Some(ProbabilityEstimate {
        l10_count: values.len().min(L10),
        l15_count: values.len().min(L15),
        l10_avg: window_mean(&values, L10),
        l15_avg: window_mean(&values, L15),
        probability: scored.map(|s| s.0),
        edge: scored.map(|s| s.1),
        direction: scored.map(|s| s.2),
        values,
    })
}

/// `None` when the player is unknown or has no history for the label.
pub fn estimate(
    history: &PlayerHistory,
    player_id: Option<u64>,
    label: &str,
    line: Option<f64>,
) -> Option<ProbabilityEstimate> {
    let player_id = player_id?;
    estimate_values(history.values_for_label(player_id, label), line)
}
