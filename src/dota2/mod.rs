use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod opendota;
pub mod summary;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("InvalidFormat: {0:?}")]
pub struct InvalidFormat(pub String);

// a non-empty run of ASCII digits, nothing else
pub fn parse_digits(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(u64);

impl AccountId {
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidFormat> {
        parse_digits(raw)
            .map(Self)
            .ok_or_else(|| InvalidFormat(raw.to_string()))
    }
}

impl From<u64> for AccountId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl TryFrom<String> for AccountId {
    type Error = InvalidFormat;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0.to_string()
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Side {
    Radiant,
    Dire,
}

impl From<u8> for Side {
    fn from(value: u8) -> Self {
        if value & 0x80u8 != 0 {
            Self::Dire
        } else {
            Self::Radiant
        }
    }
}

impl Side {
    pub fn winner(radiant_win: bool) -> Self {
        if radiant_win {
            Self::Radiant
        } else {
            Self::Dire
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Side::Radiant => "radiant",
            Side::Dire => "dire",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
        };
        f.write_str(name)
    }
}

// OpenDota lane_role: 1 safe, 2 mid, 3 off, 4 jungle
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Safe,
    Mid,
    Off,
    Jungle,
}

impl Lane {
    pub fn from_role(role: u8) -> Option<Self> {
        match role {
            1 => Some(Self::Safe),
            2 => Some(Self::Mid),
            3 => Some(Self::Off),
            4 => Some(Self::Jungle),
            _ => None,
        }
    }
}

impl Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Lane::Safe => "safe lane",
            Lane::Mid => "mid lane",
            Lane::Off => "off lane",
            Lane::Jungle => "jungle",
        };
        f.write_str(name)
    }
}
