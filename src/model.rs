use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropSource {
    PrizePicks,
    Underdog,
}

impl PropSource {
    /// Short column code used in the published tables.
    pub fn code(self) -> &'static str {
        match self {
            PropSource::PrizePicks => "PP",
            PropSource::Underdog => "UD",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            PropSource::PrizePicks => "prizepicks",
            PropSource::Underdog => "underdog",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "prizepicks" | "pp" => Some(PropSource::PrizePicks),
            "underdog" | "ud" => Some(PropSource::Underdog),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    Kills,
    Headshots,
    Assists,
    Deaths,
    Kast,
    Adr,
    Rating,
    KdDiff,
    FkDiff,
}

impl StatKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kills" | "kill" => Some(StatKind::Kills),
            "headshots" | "headshot" | "hs" => Some(StatKind::Headshots),
            "assists" | "assist" => Some(StatKind::Assists),
            "deaths" | "death" => Some(StatKind::Deaths),
            "kast" => Some(StatKind::Kast),
            "adr" => Some(StatKind::Adr),
            "rating" => Some(StatKind::Rating),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatKind::Kills => "Kills",
            StatKind::Headshots => "Hs",
            StatKind::Assists => "Assists",
            StatKind::Deaths => "Deaths",
            StatKind::Kast => "Kast",
            StatKind::Adr => "Adr",
            StatKind::Rating => "Rating",
            StatKind::KdDiff => "K-D Diff",
            StatKind::FkDiff => "FK Diff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapRange {
    Map1,
    Map2,
    Map3,
    Maps1To2,
    Maps1To3,
}

impl MapRange {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().replace('+', "-").as_str() {
            "1" => Some(MapRange::Map1),
            "2" => Some(MapRange::Map2),
            "3" => Some(MapRange::Map3),
            "1-2" => Some(MapRange::Maps1To2),
            "1-3" | "1-2-3" => Some(MapRange::Maps1To3),
            _ => None,
        }
    }

    pub fn maps(self) -> &'static [u8] {
        match self {
            MapRange::Map1 => &[1],
            MapRange::Map2 => &[2],
            MapRange::Map3 => &[3],
            MapRange::Maps1To2 => &[1, 2],
            MapRange::Maps1To3 => &[1, 2, 3],
        }
    }

    pub fn cardinality(self) -> usize {
        self.maps().len()
    }

    pub fn label(self) -> &'static str {
        match self {
            MapRange::Map1 => "Maps 1",
            MapRange::Map2 => "Maps 2",
            MapRange::Map3 => "Maps 3",
            MapRange::Maps1To2 => "Maps 1-2",
            MapRange::Maps1To3 => "Maps 1-3",
        }
    }

    fn short_label(self) -> &'static str {
        match self {
            MapRange::Map1 => "M1",
            MapRange::Map2 => "M2",
            MapRange::Map3 => "M3",
            MapRange::Maps1To2 => "M1-2",
            MapRange::Maps1To3 => "M1-3",
        }
    }
}

/// A prop stat-type label such as `MAPS 1-2 Kills`, split into range and stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatType {
    pub range: MapRange,
    pub stat: StatKind,
}

impl StatType {
    pub fn parse(label: &str) -> Option<Self> {
        let tokens: Vec<&str> = label.split_whitespace().collect();
        if tokens.len() < 3 {
            return None;
        }
        let range = MapRange::parse(tokens[1])?;
        let stat = StatKind::parse(tokens[tokens.len() - 1])?;
        Some(Self { range, stat })
    }

    pub fn display(&self) -> String {
        format!("{} {}", self.range.short_label(), self.stat.label())
    }
}

/// Display form of a raw stat-type label. Labels that do not parse are title-cased
/// with the same abbreviations applied, so they still line up across sources.
pub fn display_stat_label(raw: &str) -> String {
    if let Some(parsed) = StatType::parse(raw) {
        return parsed.display();
    }
    title_case(raw.trim())
        .replace("Maps ", "M")
        .replace("Headshots", "Hs")
        .replace("1-2-3", "1-3")
}

fn title_case(raw: &str) -> String {
    raw.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub kills: f64,
    pub headshots: f64,
    pub assists: f64,
    pub deaths: f64,
    pub kast: f64,
    pub adr: f64,
    pub rating: f64,
    #[serde(default)]
    pub kd_diff: f64,
    #[serde(default)]
    pub fk_diff: f64,
}

impl StatLine {
    pub fn get(&self, stat: StatKind) -> f64 {
        match stat {
            StatKind::Kills => self.kills,
            StatKind::Headshots => self.headshots,
            StatKind::Assists => self.assists,
            StatKind::Deaths => self.deaths,
            StatKind::Kast => self.kast,
            StatKind::Adr => self.adr,
            StatKind::Rating => self.rating,
            StatKind::KdDiff => self.kd_diff,
            StatKind::FkDiff => self.fk_diff,
        }
    }

    /// Sum count stats and average rate stats across the given maps.
    pub fn combine(lines: &[&StatLine]) -> Option<StatLine> {
        if lines.is_empty() {
            return None;
        }
        let n = lines.len() as f64;
        let sum = |f: fn(&StatLine) -> f64| lines.iter().map(|l| f(l)).sum::<f64>();
        Some(StatLine {
            kills: sum(|l| l.kills),
            headshots: sum(|l| l.headshots),
            assists: sum(|l| l.assists),
            deaths: sum(|l| l.deaths),
            kast: sum(|l| l.kast) / n,
            adr: sum(|l| l.adr) / n,
            rating: sum(|l| l.rating) / n,
            kd_diff: sum(|l| l.kd_diff) / n,
            fk_diff: sum(|l| l.fk_diff) / n,
        })
    }
}

/// One player's line for one map of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRow {
    pub match_id: u64,
    pub player_id: u64,
    pub player_name: String,
    pub team_id: u64,
    pub team_name: String,
    pub opponent: String,
    pub map_number: u8,
    #[serde(default)]
    pub map_name: String,
    pub date: NaiveDate,
    pub stats: StatLine,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawProp {
    pub source: Option<PropSource>,
    pub line_id: String,
    pub starts_at: Option<NaiveDateTime>,
    pub stat_label: Option<String>,
    pub player_name: Option<String>,
    pub team_name: Option<String>,
    pub opponent_name: Option<String>,
    pub line: Option<f64>,
    pub over_odd: Option<i32>,
    pub under_odd: Option<i32>,
    pub external_player_id: Option<String>,
    pub external_team_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    /// Matched through the source's own id via the store lookup tables.
    SourceId,
    TeamContext,
    /// Exact name match without team context.
    NameOnly,
}

impl MatchConfidence {
    pub fn tag(self) -> &'static str {
        match self {
            MatchConfidence::SourceId => "id",
            MatchConfidence::TeamContext => "team",
            MatchConfidence::NameOnly => "risky",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedProp {
    pub raw: RawProp,
    pub player_id: Option<u64>,
    pub team_id: Option<u64>,
    pub opponent_id: Option<u64>,
    pub opponent_team: Option<String>,
    pub confidence: Option<MatchConfidence>,
    pub odd: Option<i32>,
}

impl From<RawProp> for ResolvedProp {
    fn from(raw: RawProp) -> Self {
        Self {
            raw,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchupOdd {
    pub event_id: String,
    pub date: Option<NaiveDate>,
    pub team_1: String,
    pub team_2: String,
    pub odd_1: i32,
    pub odd_2: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Over,
    Under,
    Neutral,
}

impl Direction {
    pub fn from_edge(edge: f64) -> Self {
        if edge > 0.0 {
            Direction::Over
        } else if edge < 0.0 {
            Direction::Under
        } else {
            Direction::Neutral
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Direction::Over => "O",
            Direction::Under => "U",
            Direction::Neutral => "N",
        }
    }
}
