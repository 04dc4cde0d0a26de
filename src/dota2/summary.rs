use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

use super::{opendota::PlayerRecord, Lane, Outcome, Side};

pub const NOT_AVAILABLE: &str = "N/A";
pub const UNKNOWN_PLAYER: &str = "unknown";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SummaryError {
    #[error("MissingField: required field `{0}` absent from player record")]
    MissingField(&'static str),
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MatchSummary {
    pub match_id: u64,
    pub hero_id: u16,
    pub personaname: Option<String>,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub gold: Option<u32>,
    pub gold_per_min: Option<u32>,
    pub xp_per_min: Option<u32>,
    pub last_hits: Option<u32>,
    pub denies: Option<u32>,
    pub net_worth: Option<u32>,
    pub hero_damage: Option<u32>,
    pub tower_damage: Option<u32>,
    pub outcome: Outcome,
    pub lane: Option<Lane>,
}

impl MatchSummary {
    pub fn kda(&self) -> String {
        format!("{}/{}/{}", self.kills, self.deaths, self.assists)
    }

    pub fn display_name(&self) -> &str {
        self.personaname
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_PLAYER)
    }
}

pub struct Stat<T>(pub Option<T>);

impl<T: Display> Display for Stat<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(value) => value.fmt(f),
            None => f.write_str(NOT_AVAILABLE),
        }
    }
}

pub fn build(player: &PlayerRecord, match_id: u64) -> Result<MatchSummary, SummaryError> {
    let kills = player.kills.ok_or(SummaryError::MissingField("kills"))?;
    let deaths = player.deaths.ok_or(SummaryError::MissingField("deaths"))?;
    let assists = player.assists.ok_or(SummaryError::MissingField("assists"))?;
    let radiant_win = player
        .radiant_win
        .ok_or(SummaryError::MissingField("radiant_win"))?;

    let outcome = if player.side() == Side::winner(radiant_win) {
        Outcome::Win
    } else {
        Outcome::Loss
    };

    Ok(MatchSummary {
        match_id,
        hero_id: player.hero_id,
        personaname: player.personaname.clone(),
        kills,
        deaths,
        assists,
        gold: player.gold,
        gold_per_min: player.gold_per_min,
        xp_per_min: player.xp_per_min,
        last_hits: player.last_hits,
        denies: player.denies,
        net_worth: player.net_worth,
        hero_damage: player.hero_damage,
        tower_damage: player.tower_damage,
        outcome,
        lane: player.lane_role.and_then(Lane::from_role),
    })
}
