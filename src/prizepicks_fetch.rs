use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::http_client::{FetchError, fetch_text};
use crate::model::{PropSource, RawProp};
use crate::payload::{lenient_f64, lenient_string};

pub const DEFAULT_LEAGUE_ID: &str = "265";

const PROJECTIONS_URL: &str = "https://partner-api.prizepicks.com/projections";

pub fn fetch_prizepicks(client: &Client, league_id: &str) -> Result<Vec<RawProp>> {
    let url = format!("{PROJECTIONS_URL}?league_id={league_id}");
    let body = fetch_text(client, &url, HeaderMap::new())?;
    parse_prizepicks_json(&body).map_err(|err| FetchError::Decode(format!("{err:#}")).into())
}

#[derive(Debug, Deserialize)]
struct ProjectionsResponse {
    #[serde(default)]
    data: Vec<Projection>,
    #[serde(default)]
    included: Vec<Included>,
}

#[derive(Debug, Default, Deserialize)]
struct Included {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default)]
    attributes: PlayerAttributes,
    #[serde(default)]
    relationships: PlayerRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct PlayerAttributes {
    #[serde(default, deserialize_with = "lenient_string")]
    display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    team: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlayerRelationships {
    #[serde(default)]
    team_data: Relation,
}

#[derive(Debug, Default, Deserialize)]
struct Projection {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default)]
    attributes: ProjectionAttributes,
    #[serde(default)]
    relationships: ProjectionRelationships,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectionAttributes {
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    line_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    stat_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectionRelationships {
    #[serde(default)]
    new_player: Relation,
}

#[derive(Debug, Default, Deserialize)]
struct Relation {
    #[serde(default)]
    data: Option<RelationRef>,
}

#[derive(Debug, Default, Deserialize)]
struct RelationRef {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
}

impl Relation {
    fn id(&self) -> Option<&str> {
        self.data.as_ref()?.id.as_deref()
    }
}

struct PlayerInfo {
    name: Option<String>,
    team: Option<String>,
    team_id: Option<String>,
}

/// Projections payload to props. Projections whose player is missing from
/// `included` are still returned, with empty name and team.
pub fn parse_prizepicks_json(raw: &str) -> Result<Vec<RawProp>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let resp: ProjectionsResponse =
        serde_json::from_str(trimmed).context("invalid prizepicks projections json")?;

    let mut players: HashMap<String, PlayerInfo> = HashMap::new();
    for item in resp.included {
        if item.kind.as_deref() != Some("new_player") {
            continue;
        }
        let Some(id) = item.id else {
            continue;
        };
        players.entry(id).or_insert_with(|| PlayerInfo {
            name: item.attributes.display_name,
            team: item.attributes.team,
            team_id: item.relationships.team_data.id().map(str::to_string),
        });
    }

    let mut props = Vec::with_capacity(resp.data.len());
    for projection in resp.data {
        let attrs = projection.attributes;
        let player_id = projection.relationships.new_player.id().map(str::to_string);
        let info = player_id.as_deref().and_then(|id| players.get(id));
        props.push(RawProp {
            source: Some(PropSource::PrizePicks),
            line_id: projection.id.unwrap_or_default(),
            starts_at: attrs.start_time.as_deref().and_then(parse_start_time),
            stat_label: attrs.stat_type.map(|s| s.replace("MAP 3", "MAPS 3")),
            player_name: info.and_then(|p| p.name.clone()),
            team_name: info.and_then(|p| p.team.clone()),
            opponent_name: attrs.description.as_deref().and_then(opponent_from_description),
            line: attrs.line_score,
            over_odd: None,
            under_odd: None,
            external_player_id: player_id,
            external_team_id: info.and_then(|p| p.team_id.clone()),
        });
    }
    Ok(props)
}

/// Local wall-clock time of the listed start.
fn parse_start_time(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.naive_local())
        .ok()
}

/// Descriptions read like `"FaZe MAPS 1-2"`; the opponent is everything before
/// the map marker.
pub fn opponent_from_description(description: &str) -> Option<String> {
    let normalized = description.replace("MAPS", "MAP").replace("MAP", "MAPS");
    let opponent = normalized.split("MAPS").next().unwrap_or_default().trim();
    (!opponent.is_empty()).then(|| opponent.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opponent_strips_map_suffix() {
        assert_eq!(opponent_from_description("FaZe MAPS 1-2"), Some("FaZe".to_string()));
        assert_eq!(opponent_from_description("NAVI MAP 3"), Some("NAVI".to_string()));
        assert_eq!(opponent_from_description("Vitality"), Some("Vitality".to_string()));
        assert_eq!(opponent_from_description("MAPS 1-2"), None);
    }

    #[test]
    fn empty_payload_is_no_props() {
        assert!(parse_prizepicks_json("").unwrap().is_empty());
        assert!(parse_prizepicks_json("null").unwrap().is_empty());
        assert!(parse_prizepicks_json("{}").unwrap().is_empty());
    }

    #[test]
    fn start_time_keeps_local_clock() {
        let dt = parse_start_time("2024-03-01T10:30:00-05:00").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-03-01 10:30");
        assert!(parse_start_time("soon").is_none());
    }
}
