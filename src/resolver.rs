use crate::dota2::{
    opendota::{HeroIndex, MatchPayload, PlayerRecord},
    AccountId,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub account: Option<AccountId>,
    pub hero_name: Option<String>,
}

impl Criteria {
    pub fn account(account: AccountId) -> Self {
        Self {
            account: Some(account),
            hero_name: None,
        }
    }
}

// None is a normal outcome for both lookups

pub fn by_account(payload: &MatchPayload, account: AccountId) -> Option<&PlayerRecord> {
    payload.players.iter().find(|p| p.is_account(account))
}

pub fn by_hero<'a>(
    payload: &'a MatchPayload,
    name: &str,
    heroes: &HeroIndex,
) -> Option<&'a PlayerRecord> {
    let ids = heroes.ids_named(name);
    payload.players.iter().find(|p| ids.contains(&p.hero_id))
}
