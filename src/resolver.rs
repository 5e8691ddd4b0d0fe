use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::fuzz;
use crate::model::{HistoricalRow, MatchConfidence, MatchupOdd, PropSource, ResolvedProp};
use crate::store::SourceIdIndex;

const GENERIC_TEAM_WORDS: &[&str] = &["esports", "esport", "sport", "sports", "team"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskyMatchPolicy {
    /// Name-only matches are estimated like any other match.
    #[default]
    Trust,
    /// Name-only matches are counted but left unresolved.
    Exclude,
}

impl RiskyMatchPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trust" => Some(RiskyMatchPolicy::Trust),
            "exclude" => Some(RiskyMatchPolicy::Exclude),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub team_candidates: usize,
    pub player_cutoff: u8,
    pub name_only_candidates: usize,
    pub opponent_cutoff: u8,
    pub odds_cutoff: u8,
    pub risky_policy: RiskyMatchPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            team_candidates: 5,
            player_cutoff: 80,
            name_only_candidates: 10,
            opponent_cutoff: 65,
            odds_cutoff: 60,
            risky_policy: RiskyMatchPolicy::Trust,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Ids {
    player_id: u64,
    team_id: u64,
    date: NaiveDate,
}

/// Distinct team and player names from the historical rows, with the most recent
/// ids seen for each.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    teams: Vec<String>,
    players: Vec<String>,
    players_by_team: HashMap<String, Vec<String>>,
    ids_by_team_player: HashMap<(String, String), Ids>,
    ids_by_player: HashMap<String, Ids>,
    team_ids: HashMap<String, (u64, NaiveDate)>,
}

impl Roster {
    pub fn from_rows(rows: &[HistoricalRow]) -> Self {
        let mut roster = Roster::default();
        for row in rows {
            let ids = Ids {
                player_id: row.player_id,
                team_id: row.team_id,
                date: row.date,
            };

            if !roster.team_ids.contains_key(&row.team_name) {
                roster.teams.push(row.team_name.clone());
            }
            let team_slot = roster
                .team_ids
                .entry(row.team_name.clone())
                .or_insert((row.team_id, row.date));
            if row.date >= team_slot.1 {
                *team_slot = (row.team_id, row.date);
            }

            if !roster.ids_by_player.contains_key(&row.player_name) {
                roster.players.push(row.player_name.clone());
            }
            keep_latest(&mut roster.ids_by_player, row.player_name.clone(), ids);

            let key = (row.team_name.clone(), row.player_name.clone());
            if !roster.ids_by_team_player.contains_key(&key) {
                roster
                    .players_by_team
                    .entry(row.team_name.clone())
                    .or_default()
                    .push(row.player_name.clone());
            }
            keep_latest(&mut roster.ids_by_team_player, key, ids);
        }
        roster
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn players(&self) -> &[String] {
        &self.players
    }

    pub fn team_id(&self, team: &str) -> Option<u64> {
        self.team_ids.get(team).map(|(id, _)| *id)
    }

    fn players_of(&self, team: &str) -> &[String] {
        self.players_by_team
            .get(team)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn team_player_ids(&self, team: &str, player: &str) -> Option<Ids> {
        self.ids_by_team_player
            .get(&(team.to_string(), player.to_string()))
            .copied()
    }

    fn player_ids(&self, player: &str) -> Option<Ids> {
        self.ids_by_player.get(player).copied()
    }
}

fn keep_latest<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Ids>, key: K, ids: Ids) {
    match map.get_mut(&key) {
        Some(existing) if ids.date >= existing.date => *existing = ids,
        Some(_) => {}
        None => {
            map.insert(key, ids);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionSummary {
    pub total: usize,
    pub source_id_matched: usize,
    pub team_matched: usize,
    pub risky: usize,
    pub unresolved: usize,
    pub opponents_resolved: usize,
    pub odds_attached: usize,
}

impl ResolutionSummary {
    pub fn located(&self) -> usize {
        self.total - self.unresolved
    }

    pub fn located_pct(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.located() as f64 / self.total as f64 * 100.0
    }
}

/// Drop generic words such as "Team" or "Esports" from a team name.
pub fn strip_generic_team_words(name: &str) -> String {
    name.split_whitespace()
        .filter(|word| !GENERIC_TEAM_WORDS.contains(&word.to_ascii_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

pub struct Resolver<'a> {
    roster: &'a Roster,
    source_ids: Option<&'a SourceIdIndex>,
    cfg: ResolverConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(roster: &'a Roster, cfg: ResolverConfig) -> Self {
        Self {
            roster,
            source_ids: None,
            cfg,
        }
    }

    pub fn with_source_ids(mut self, source_ids: &'a SourceIdIndex) -> Self {
        self.source_ids = Some(source_ids);
        self
    }

    /// Attach canonical ids to every prop. Props that cannot be matched keep `None`.
    pub fn resolve(&self, props: &mut [ResolvedProp]) -> ResolutionSummary {
        let mut summary = ResolutionSummary {
            total: props.len(),
            ..ResolutionSummary::default()
        };

        summary.source_id_matched = self.source_id_pass(props);
        let mut team_memo: HashMap<String, String> = HashMap::new();
        summary.team_matched = self.team_first_pass(props, &mut team_memo);
        summary.risky = self.name_only_pass(props);
        summary.opponents_resolved = self.opponent_pass(props, &team_memo);
        summary.unresolved = props.iter().filter(|p| p.player_id.is_none()).count();
        summary
    }

    fn source_id_pass(&self, props: &mut [ResolvedProp]) -> usize {
        let Some(index) = self.source_ids else {
            return 0;
        };
        let mut matched = 0;
        for prop in props.iter_mut() {
            let Some(source) = prop.raw.source else {
                continue;
            };
            if let Some(team_ext) = non_empty(prop.raw.external_team_id.as_ref()) {
                prop.team_id = index.team(source, team_ext);
            }
            let Some(player_ext) = non_empty(prop.raw.external_player_id.as_ref()) else {
                continue;
            };
            if let Some(player_id) = index.player(source, player_ext) {
                prop.player_id = Some(player_id);
                prop.confidence = Some(MatchConfidence::SourceId);
                matched += 1;
            }
        }
        matched
    }

    fn team_first_pass(
        &self,
        props: &mut [ResolvedProp],
        team_memo: &mut HashMap<String, String>,
    ) -> usize {
        let mut matched = 0;
        for prop in props.iter_mut() {
            if prop.player_id.is_some() {
                continue;
            }
            let (Some(team), Some(player)) = (
                non_empty(prop.raw.team_name.as_ref()),
                non_empty(prop.raw.player_name.as_ref()),
            ) else {
                continue;
            };

            let normalized_team = strip_generic_team_words(team);
            let candidates =
                fuzz::extract(&normalized_team, self.roster.teams(), self.cfg.team_candidates);
            for team_candidate in candidates {
                let roster_players = self.roster.players_of(team_candidate.choice);
                let Some(best) = fuzz::extract_one(player, roster_players, self.cfg.player_cutoff)
                else {
                    continue;
                };
                let Some(ids) = self.roster.team_player_ids(team_candidate.choice, best.choice)
                else {
                    continue;
                };

                debug!(
                    player,
                    team,
                    canonical_team = team_candidate.choice,
                    canonical_player = best.choice,
                    score = best.score,
                    "team-context match"
                );
                prop.player_id = Some(ids.player_id);
                prop.team_id = Some(ids.team_id);
                prop.confidence = Some(MatchConfidence::TeamContext);
                team_memo
                    .entry(normalized_team.clone())
                    .or_insert_with(|| team_candidate.choice.to_string());
                matched += 1;
                break;
            }
        }
        matched
    }

    fn name_only_pass(&self, props: &mut [ResolvedProp]) -> usize {
        let mut risky = 0;
        for prop in props.iter_mut() {
            if prop.player_id.is_some() {
                continue;
            }
            let Some(player) = non_empty(prop.raw.player_name.as_ref()) else {
                continue;
            };

            let candidates =
                fuzz::extract(player, self.roster.players(), self.cfg.name_only_candidates);
            for candidate in candidates {
                if candidate.score < 100 {
                    continue;
                }
                let Some(ids) = self.roster.player_ids(candidate.choice) else {
                    continue;
                };
                prop.confidence = Some(MatchConfidence::NameOnly);
                if self.cfg.risky_policy == RiskyMatchPolicy::Trust {
                    prop.player_id = Some(ids.player_id);
                }
                risky += 1;
                break;
            }
        }
        risky
    }

    fn opponent_pass(&self, props: &mut [ResolvedProp], team_memo: &HashMap<String, String>) -> usize {
        let mut resolved = 0;
        for prop in props.iter_mut() {
            let Some(opponent) = non_empty(prop.raw.opponent_name.as_ref()) else {
                continue;
            };
            let normalized = strip_generic_team_words(opponent);
            let canonical = match team_memo.get(&normalized) {
                Some(team) => Some(team.clone()),
                None => fuzz::extract_one(&normalized, self.roster.teams(), self.cfg.opponent_cutoff)
                    .map(|c| c.choice.to_string()),
            };
            let Some(canonical) = canonical else {
                continue;
            };
            prop.opponent_id = self.roster.team_id(&canonical);
            prop.opponent_team = Some(canonical);
            resolved += 1;
        }
        resolved
    }

    /// Attach the moneyline odd of the prop's own team. Returns the number of props
    /// carrying an odd afterwards.
    pub fn attach_odds(&self, props: &mut [ResolvedProp], odds: &[MatchupOdd]) -> usize {
        let mut prop_teams: Vec<String> = Vec::new();
        for name in props
            .iter()
            .filter_map(|p| p.raw.team_name.as_ref())
            .chain(props.iter().filter_map(|p| p.raw.opponent_name.as_ref()))
        {
            if !prop_teams.contains(name) {
                prop_teams.push(name.clone());
            }
        }

        for odd in odds {
            let team_1 = strip_generic_team_words(&odd.team_1);
            let team_2 = strip_generic_team_words(&odd.team_2);
            let (Some(best_1), Some(best_2)) = (
                fuzz::extract_one(&team_1, &prop_teams, self.cfg.odds_cutoff),
                fuzz::extract_one(&team_2, &prop_teams, self.cfg.odds_cutoff),
            ) else {
                continue;
            };

            for prop in props.iter_mut() {
                let (Some(team), Some(opp)) =
                    (prop.raw.team_name.as_deref(), prop.raw.opponent_name.as_deref())
                else {
                    continue;
                };
                if team == best_1.choice && opp == best_2.choice {
                    prop.odd = Some(odd.odd_1);
                } else if team == best_2.choice && opp == best_1.choice {
                    prop.odd = Some(odd.odd_2);
                }
            }
        }
        props.iter().filter(|p| p.odd.is_some()).count()
    }
}

pub fn log_summary(source: PropSource, summary: &ResolutionSummary) {
    info!(
        "Located {:.0}% ({}/{}) of the props on {}",
        summary.located_pct(),
        summary.located(),
        summary.total,
        source.code()
    );
    info!(
        "{} props are risky matches (inactive or change of team) on {}",
        summary.risky,
        source.code()
    );
    debug!(
        source = source.code(),
        source_id = summary.source_id_matched,
        team = summary.team_matched,
        opponents = summary.opponents_resolved,
        odds = summary.odds_attached,
        "resolution breakdown"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RawProp, StatLine};

    fn hist(player_id: u64, player: &str, team_id: u64, team: &str, day: u32) -> HistoricalRow {
        HistoricalRow {
            match_id: u64::from(day),
            player_id,
            player_name: player.to_string(),
            team_id,
            team_name: team.to_string(),
            opponent: "X".to_string(),
            map_number: 1,
            map_name: "Inferno".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            stats: StatLine::default(),
        }
    }

    fn prop(player: Option<&str>, team: Option<&str>, opp: Option<&str>) -> ResolvedProp {
        ResolvedProp::from(RawProp {
            source: Some(PropSource::PrizePicks),
            player_name: player.map(str::to_string),
            team_name: team.map(str::to_string),
            opponent_name: opp.map(str::to_string),
            ..RawProp::default()
        })
    }

    #[test]
    fn strips_generic_words_case_insensitively() {
        assert_eq!(strip_generic_team_words("Team Liquid Esports"), "Liquid");
        assert_eq!(strip_generic_team_words("TEAM spirit"), "spirit");
        assert_eq!(strip_generic_team_words("Sports"), "");
    }

    #[test]
    fn roster_keeps_latest_ids() {
        let rows = vec![hist(1, "ropz", 10, "FaZe", 1), hist(1, "ropz", 20, "MOUZ", 2)];
        let roster = Roster::from_rows(&rows);
        assert_eq!(roster.player_ids("ropz").map(|i| i.team_id), Some(20));
        assert_eq!(roster.teams(), &["FaZe".to_string(), "MOUZ".to_string()]);
    }

    #[test]
    fn missing_names_never_resolve_or_panic() {
        let rows = vec![hist(1, "ropz", 10, "FaZe", 1)];
        let roster = Roster::from_rows(&rows);
        let resolver = Resolver::new(&roster, ResolverConfig::default());
        let mut props = vec![
            prop(None, Some("FaZe"), None),
            prop(Some(""), Some(""), Some("")),
            prop(Some("ropz"), None, None),
        ];
        let summary = resolver.resolve(&mut props);
        assert!(props[0].player_id.is_none());
        assert!(props[1].player_id.is_none());
        // No team, but the exact name still matches in the fallback pass.
        assert_eq!(props[2].player_id, Some(1));
        assert_eq!(summary.unresolved, 2);
        assert_eq!(summary.risky, 1);
    }

    #[test]
    fn swapped_letters_still_clear_player_cutoff() {
        let rows = vec![hist(1, "torzsi", 10, "MOUZ", 1), hist(2, "Jimpphat", 10, "MOUZ", 1)];
        let roster = Roster::from_rows(&rows);
        let resolver = Resolver::new(&roster, ResolverConfig::default());
        let mut props = vec![prop(Some("torszi"), Some("MOUZ"), None)];
        let summary = resolver.resolve(&mut props);
        assert_eq!(props[0].player_id, Some(1));
        assert_eq!(props[0].team_id, Some(10));
        assert_eq!(props[0].confidence, Some(MatchConfidence::TeamContext));
        assert_eq!(summary.team_matched, 1);
    }

    #[test]
    fn exclude_policy_withholds_name_only_ids() {
        let rows = vec![hist(1, "ropz", 10, "FaZe", 1)];
        let roster = Roster::from_rows(&rows);
        let cfg = ResolverConfig {
            risky_policy: RiskyMatchPolicy::Exclude,
            ..ResolverConfig::default()
        };
        let resolver = Resolver::new(&roster, cfg);
        let mut props = vec![prop(Some("ropz"), None, None)];
        let summary = resolver.resolve(&mut props);
        assert_eq!(summary.risky, 1);
        assert!(props[0].player_id.is_none());
        assert_eq!(props[0].confidence, Some(MatchConfidence::NameOnly));
    }

    #[test]
    fn source_ids_take_precedence() {
        let rows = vec![hist(1, "ropz", 10, "FaZe", 1), hist(2, "rain", 10, "FaZe", 1)];
        let roster = Roster::from_rows(&rows);
        let mut index = SourceIdIndex::default();
        index
            .players
            .insert((PropSource::PrizePicks, "pp-77".to_string()), 2);
        let resolver = Resolver::new(&roster, ResolverConfig::default()).with_source_ids(&index);
        let mut p = prop(Some("ropz"), Some("FaZe"), None);
        p.raw.external_player_id = Some("pp-77".to_string());
        let mut props = vec![p];
        let summary = resolver.resolve(&mut props);
        assert_eq!(props[0].player_id, Some(2));
        assert_eq!(props[0].confidence, Some(MatchConfidence::SourceId));
        assert_eq!(summary.source_id_matched, 1);
        assert_eq!(summary.team_matched, 0);
    }

    #[test]
    fn opponent_unmatched_stays_none() {
        let rows = vec![hist(1, "ropz", 10, "FaZe", 1)];
        let roster = Roster::from_rows(&rows);
        let resolver = Resolver::new(&roster, ResolverConfig::default());
        let mut props = vec![prop(Some("ropz"), Some("FaZe"), Some("Completely Different"))];
        resolver.resolve(&mut props);
        assert!(props[0].opponent_id.is_none());
        assert!(props[0].opponent_team.is_none());
    }
}
