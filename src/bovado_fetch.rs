use anyhow::{Context, Result};
use chrono::DateTime;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use serde::Deserialize;

use crate::http_client::{FetchError, fetch_text};
use crate::model::MatchupOdd;
use crate::payload::{lenient_american, lenient_string};

const EVENTS_URL: &str = "https://www.bovada.lv/services/sports/event/coupon/events/A/description/esports/counter-strike-2?marketFilterId=def&preMatchOnly=true";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub fn fetch_bovado(client: &Client) -> Result<Vec<MatchupOdd>> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.bovada.lv/"));
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    let body = fetch_text(client, EVENTS_URL, headers)?;
    parse_bovado_json(&body).map_err(|err| FetchError::Decode(format!("{err:#}")).into())
}

#[derive(Debug, Deserialize)]
struct Coupon {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Event {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    #[serde(default)]
    start_time: Option<i64>,
    #[serde(default)]
    display_groups: Vec<DisplayGroup>,
}

#[derive(Debug, Deserialize)]
struct DisplayGroup {
    #[serde(default)]
    markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
struct Market {
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default)]
    outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
struct Outcome {
    #[serde(default, deserialize_with = "lenient_string")]
    description: Option<String>,
    #[serde(default)]
    price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    #[serde(default, deserialize_with = "lenient_american")]
    american: Option<i32>,
}

/// Moneyline odds per event. Events without a two-sided moneyline are skipped;
/// the first listing of an event id wins.
pub fn parse_bovado_json(raw: &str) -> Result<Vec<MatchupOdd>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let coupons: Vec<Coupon> = serde_json::from_str(trimmed).context("invalid bovado events json")?;

    let mut out: Vec<MatchupOdd> = Vec::new();
    for event in coupons.into_iter().flat_map(|c| c.events) {
        let Some(event_id) = event.id else {
            continue;
        };
        if out.iter().any(|o| o.event_id == event_id) {
            continue;
        }
        let Some(market) = event.display_groups.first().and_then(|g| {
            g.markets
                .iter()
                .find(|m| m.description.as_deref() == Some("Moneyline"))
        }) else {
            continue;
        };
        let sides: Vec<(&str, i32)> = market
            .outcomes
            .iter()
            .filter_map(|o| {
                let name = o.description.as_deref()?;
                let price = o.price.as_ref()?.american?;
                Some((name, price))
            })
            .collect();
        let [(team_1, odd_1), (team_2, odd_2)] = sides.as_slice() else {
            continue;
        };
        out.push(MatchupOdd {
            event_id,
            date: event
                .start_time
                .and_then(DateTime::from_timestamp_millis)
                .map(|dt| dt.date_naive()),
            team_1: team_1.to_string(),
            team_2: team_2.to_string(),
            odd_1: *odd_1,
            odd_2: *odd_2,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_sided_markets_are_skipped() {
        let raw = r#"[{"events":[{"id":"1","description":"A vs B","startTime":1709294400000,
            "displayGroups":[{"markets":[{"description":"Moneyline",
            "outcomes":[{"description":"A","price":{"american":"-150"}}]}]}]}]}]"#;
        assert!(parse_bovado_json(raw).unwrap().is_empty());
    }

    #[test]
    fn empty_body_is_no_odds() {
        assert!(parse_bovado_json(" ").unwrap().is_empty());
        assert!(parse_bovado_json("[]").unwrap().is_empty());
    }
}
