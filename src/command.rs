use itertools::Itertools;

use crate::dota2::{parse_digits, AccountId, InvalidFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    ProfileHelp,
    // raw text, the bind validates it
    Bind(String),
    Analyze(Option<AccountId>),
    AnalyzeMatch(String),
    Unknown(String),
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, InvalidFormat> {
        let text = text.trim();
        let (head, rest) = text
            .split_once(char::is_whitespace)
            .map_or((text, ""), |(head, rest)| (head, rest.trim()));
        // `/analyze@my_bot` in group chats
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

        let command = match name.as_str() {
            "/start" => Self::Start,
            "/help" | "/profile" => Self::ProfileHelp,
            "/setsteam" | "/bind" => Self::Bind(text.to_string()),
            "/analyze" if rest.is_empty() => Self::Analyze(None),
            "/analyze" => Self::Analyze(Some(AccountId::parse(rest)?)),
            "/match" => Self::AnalyzeMatch(rest.to_string()),
            _ => Self::Unknown(head.to_string()),
        };
        Ok(command)
    }
}

pub fn parse_bind(raw: &str) -> Result<AccountId, InvalidFormat> {
    let (_, account) = raw
        .split_whitespace()
        .collect_tuple::<(&str, &str)>()
        .ok_or_else(|| InvalidFormat(raw.to_string()))?;
    AccountId::parse(account)
}

pub fn parse_match_ref(raw: &str) -> Result<(u64, String), InvalidFormat> {
    let invalid = || InvalidFormat(raw.to_string());
    let (match_id, hero) = raw.split_once(':').ok_or_else(invalid)?;
    let match_id = parse_digits(match_id.trim()).ok_or_else(invalid)?;
    let hero = hero.trim();
    if hero.is_empty() {
        return Err(invalid());
    }
    Ok((match_id, hero.to_string()))
}
