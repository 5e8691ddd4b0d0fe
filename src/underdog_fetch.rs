use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::http_client::{FetchError, fetch_text};
use crate::model::{PropSource, RawProp};
use crate::payload::{lenient_american, lenient_f64, lenient_string};

const LINES_URL: &str = "https://api.underdogfantasy.com/beta/v5/over_under_lines";
const TEAMS_URL: &str = "https://stats.underdogfantasy.com/v1/teams";
const CS_SPORT_ID: &str = "CS";

pub fn fetch_underdog(client: &Client) -> Result<Vec<RawProp>> {
    let lines = fetch_text(client, LINES_URL, HeaderMap::new())?;
    let teams = fetch_text(client, TEAMS_URL, HeaderMap::new())?;
    let teams = parse_underdog_teams_json(&teams)
        .map_err(|err| anyhow::Error::from(FetchError::Decode(format!("{err:#}"))))?;
    parse_underdog_json(&lines, &teams)
        .map_err(|err| FetchError::Decode(format!("{err:#}")).into())
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnderdogTeam {
    pub abbr: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<TeamEntry>,
}

#[derive(Debug, Deserialize)]
struct TeamEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    abbr: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
}

/// Team id to team names from the stats teams endpoint.
pub fn parse_underdog_teams_json(raw: &str) -> Result<HashMap<String, UnderdogTeam>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(HashMap::new());
    }
    let resp: TeamsResponse = serde_json::from_str(trimmed).context("invalid underdog teams json")?;
    Ok(resp
        .teams
        .into_iter()
        .filter_map(|t| {
            let id = t.id?;
            Some((
                id,
                UnderdogTeam {
                    abbr: t.abbr,
                    name: t.name,
                },
            ))
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct LinesResponse {
    #[serde(default)]
    players: Vec<Player>,
    #[serde(default)]
    appearances: Vec<Appearance>,
    #[serde(default)]
    games: Vec<Game>,
    #[serde(default)]
    over_under_lines: Vec<OverUnderLine>,
}

#[derive(Debug, Deserialize)]
struct Player {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    sport_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    team_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Appearance {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    player_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    match_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Game {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    home_team_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    away_team_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    scheduled_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverUnderLine {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    stat_value: Option<f64>,
    #[serde(default)]
    options: Vec<LineOption>,
    #[serde(default)]
    over_under: Option<OverUnder>,
}

#[derive(Debug, Deserialize)]
struct LineOption {
    #[serde(default, deserialize_with = "lenient_string")]
    choice_display: Option<String>,
    #[serde(default, deserialize_with = "lenient_american")]
    american_price: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OverUnder {
    #[serde(default)]
    appearance_stat: Option<AppearanceStat>,
}

#[derive(Debug, Deserialize)]
struct AppearanceStat {
    #[serde(default, deserialize_with = "lenient_string")]
    appearance_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    display_stat: Option<String>,
}

/// Counter-Strike over/under lines joined through appearance and game to the
/// player's team and opponent.
pub fn parse_underdog_json(raw: &str, teams: &HashMap<String, UnderdogTeam>) -> Result<Vec<RawProp>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let resp: LinesResponse =
        serde_json::from_str(trimmed).context("invalid underdog over_under_lines json")?;

    let games: HashMap<&str, &Game> = resp
        .games
        .iter()
        .filter_map(|g| Some((g.id.as_deref()?, g)))
        .collect();
    let mut lines_by_appearance: HashMap<&str, Vec<&OverUnderLine>> = HashMap::new();
    for line in &resp.over_under_lines {
        let Some(appearance_id) = line
            .over_under
            .as_ref()
            .and_then(|ou| ou.appearance_stat.as_ref())
            .and_then(|stat| stat.appearance_id.as_deref())
        else {
            continue;
        };
        lines_by_appearance.entry(appearance_id).or_default().push(line);
    }

    let mut props = Vec::new();
    for player in &resp.players {
        if player.sport_id.as_deref() != Some(CS_SPORT_ID) {
            continue;
        }
        let Some(player_id) = player.id.as_deref() else {
            continue;
        };
        let team_name = player
            .team_id
            .as_deref()
            .and_then(|id| teams.get(id))
            .and_then(|t| t.name.clone());

        for appearance in &resp.appearances {
            if appearance.player_id.as_deref() != Some(player_id) {
                continue;
            }
            let (Some(appearance_id), Some(game)) = (
                appearance.id.as_deref(),
                appearance.match_id.as_deref().and_then(|id| games.get(id)),
            ) else {
                continue;
            };
            let starts_at = game.scheduled_at.as_deref().and_then(|s| {
                NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%dT%H:%M:%SZ").ok()
            });
            let opponent = match (game.title.as_deref(), team_name.as_deref()) {
                (Some(title), Some(team)) => opponent_from_title(title, team),
                _ => None,
            }
            .or_else(|| opponent_from_ids(game, player.team_id.as_deref(), teams));

            for line in lines_by_appearance.get(appearance_id).into_iter().flatten() {
                let (over_odd, under_odd) = split_odds(&line.options);
                let stat_label = line
                    .over_under
                    .as_ref()
                    .and_then(|ou| ou.appearance_stat.as_ref())
                    .and_then(|stat| stat.display_stat.as_deref())
                    .map(fix_map_name);
                props.push(RawProp {
                    source: Some(PropSource::Underdog),
                    line_id: line.id.clone().unwrap_or_default(),
                    starts_at,
                    stat_label,
                    player_name: player.last_name.clone(),
                    team_name: team_name.clone(),
                    opponent_name: opponent.clone(),
                    line: line.stat_value,
                    over_odd,
                    under_odd,
                    external_player_id: Some(player_id.to_string()),
                    external_team_id: player.team_id.clone(),
                });
            }
        }
    }
    Ok(props)
}

fn opponent_from_ids(
    game: &Game,
    team_id: Option<&str>,
    teams: &HashMap<String, UnderdogTeam>,
) -> Option<String> {
    let team_id = team_id?;
    let other = if game.home_team_id.as_deref() == Some(team_id) {
        game.away_team_id.as_deref()?
    } else if game.away_team_id.as_deref() == Some(team_id) {
        game.home_team_id.as_deref()?
    } else {
        return None;
    };
    teams.get(other)?.name.clone()
}

fn split_odds(options: &[LineOption]) -> (Option<i32>, Option<i32>) {
    if options.len() != 2 {
        return (None, None);
    }
    let mut over = None;
    let mut under = None;
    for option in options {
        if option.choice_display.as_deref() == Some("Higher") {
            over = option.american_price;
        } else {
            under = option.american_price;
        }
    }
    (over, under)
}

/// `"Kills on Maps 1+2"` becomes `"Maps 1-2 Kills"`.
pub fn fix_map_name(display_stat: &str) -> String {
    let Some((stat, maps)) = display_stat.split_once(" on ") else {
        return display_stat.trim().to_string();
    };
    format!("{} {}", maps.trim(), stat.trim())
        .replace("Map 1", "Maps 1")
        .replace('+', "-")
}

/// Match titles read `"Team A vs Team B"`; the opponent is the title without the
/// player's own team.
pub fn opponent_from_title(title: &str, team: &str) -> Option<String> {
    let team = team.trim();
    if team.is_empty() {
        return None;
    }
    let rest = title.replacen(team, "", 1);
    let opponent = rest
        .split_whitespace()
        .filter(|word| !word.eq_ignore_ascii_case("vs") && !word.eq_ignore_ascii_case("vs."))
        .collect::<Vec<_>>()
        .join(" ");
    (!opponent.is_empty()).then_some(opponent)
}
