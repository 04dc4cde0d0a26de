// response definitions for the OpenDota endpoints we use
// OpenDota adds fields all the time, so unknown fields are accepted here

use serde::{Deserialize, Serialize};

use super::{AccountId, Side};

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct RecentMatch {
    pub match_id: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct PlayerRecord {
    // anonymous players come back as null
    #[serde(default)]
    pub account_id: Option<u32>,
    pub player_slot: u8,
    pub hero_id: u16,
    #[serde(default)]
    pub personaname: Option<String>,
    #[serde(default)]
    pub kills: Option<u32>,
    #[serde(default)]
    pub deaths: Option<u32>,
    #[serde(default)]
    pub assists: Option<u32>,
    #[serde(default)]
    pub gold: Option<u32>,
    #[serde(default)]
    pub gold_per_min: Option<u32>,
    #[serde(default)]
    pub xp_per_min: Option<u32>,
    #[serde(default)]
    pub hero_damage: Option<u32>,
    #[serde(default)]
    pub tower_damage: Option<u32>,
    #[serde(default)]
    pub last_hits: Option<u32>,
    #[serde(default)]
    pub denies: Option<u32>,
    #[serde(default)]
    pub net_worth: Option<u32>,
    #[serde(default)]
    pub lane_role: Option<u8>,
    #[serde(default)]
    pub radiant_win: Option<bool>,
}

impl PlayerRecord {
    pub fn side(&self) -> Side {
        self.player_slot.into()
    }

    pub fn is_account(&self, account: AccountId) -> bool {
        self.account_id
            .is_some_and(|id| u64::from(id) == account.get())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct MatchPayload {
    pub match_id: u64,
    pub radiant_win: bool,
    pub players: Vec<PlayerRecord>,
}

impl MatchPayload {
    // players of unparsed matches may lack their own radiant_win
    // so the match-level flag is copied down
    pub fn normalized(mut self) -> Self {
        let radiant_win = self.radiant_win;
        self.players
            .iter_mut()
            .filter(|p| p.radiant_win.is_none())
            .for_each(|p| p.radiant_win = Some(radiant_win));
        self
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Hero {
    pub id: u16,
    // internal name, e.g. `npc_dota_hero_antimage`
    pub name: String,
    pub localized_name: String,
}

impl Hero {
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix("npc_dota_hero_")
            .unwrap_or(&self.name)
    }

    pub fn matches_name(&self, query: &str) -> bool {
        let query = query.trim();
        self.localized_name.eq_ignore_ascii_case(query)
            || self.name.eq_ignore_ascii_case(query)
            || self.short_name().eq_ignore_ascii_case(query)
    }
}

#[derive(Clone, Debug, Default)]
pub struct HeroIndex {
    heroes: Vec<Hero>,
}

impl HeroIndex {
    pub fn new(heroes: Vec<Hero>) -> Self {
        Self { heroes }
    }

    pub fn ids_named(&self, query: &str) -> Vec<u16> {
        self.heroes
            .iter()
            .filter(|hero| hero.matches_name(query))
            .map(|hero| hero.id)
            .collect()
    }

    pub fn name_of(&self, hero_id: u16) -> Option<&str> {
        self.heroes
            .iter()
            .find(|hero| hero.id == hero_id)
            .map(|hero| hero.localized_name.as_str())
    }
}
