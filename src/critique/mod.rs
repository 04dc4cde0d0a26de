pub mod openai;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dota2::summary::{MatchSummary, Stat};

pub use openai::OpenAiBackend;

const COACH_ROLE: &str = "You are a strict but fair professional Dota 2 coach. \
You review a single player's performance in one match. \
Name the two or three most important mistakes the numbers reveal and give one concrete, \
actionable tip for each. Be direct, no more than 120 words, no greetings.";

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("RequestError: {0}")]
    Request(#[from] reqwest::Error),
    #[error("StatusError: backend answered {0}: {1}")]
    Status(reqwest::StatusCode, String),
    #[error("DecodeError: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("EmptyResponse: backend returned no text")]
    Empty,
    #[error("NotConfigured: no completion backend")]
    NotConfigured,
    #[error("Timeout: no answer after {0:?}")]
    Timeout(Duration),
    #[error("Serialize: {0}")]
    Serialize(serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;
}

pub struct CritiqueGenerator {
    backend: Option<Arc<dyn CompletionBackend>>,
    timeout: Duration,
}

impl CritiqueGenerator {
    pub fn new(backend: Option<Arc<dyn CompletionBackend>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn generate(&self, summary: &MatchSummary, match_id: u64) -> String {
        match self.try_generate(summary, match_id).await {
            Ok(text) => text,
            Err(err) => {
                log::warn!("critique for match {} falls back: {}", match_id, err);
                fallback(summary)
            }
        }
    }

    async fn try_generate(
        &self,
        summary: &MatchSummary,
        match_id: u64,
    ) -> Result<String, BackendError> {
        let Some(backend) = &self.backend else {
            return Err(BackendError::NotConfigured);
        };
        let messages = prompt(summary, match_id)?;
        let text = tokio::time::timeout(self.timeout, backend.complete(&messages))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))??;
        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::Empty);
        }
        Ok(text.to_string())
    }
}

pub fn prompt(summary: &MatchSummary, match_id: u64) -> Result<Vec<ChatMessage>, BackendError> {
    let data = serde_json::to_string_pretty(summary).map_err(BackendError::Serialize)?;
    Ok(vec![
        ChatMessage::new(Role::System, COACH_ROLE),
        ChatMessage::new(
            Role::User,
            format!("Analyze my performance in match {match_id}. Player data:\n{data}"),
        ),
    ])
}

pub fn fallback(summary: &MatchSummary) -> String {
    let economy = match (summary.gold_per_min, summary.gold) {
        (Some(gpm), _) => format!("{gpm} GPM"),
        (None, gold) => format!("{} gold", Stat(gold)),
    };
    let verdict = match summary.deaths {
        0..=3 => "keep that discipline and push your farm further",
        4..=7 => "cut a couple of those deaths and your impact will grow",
        _ => "dying that often hands the enemy the game, so play safer and watch the minimap",
    };
    let times = if summary.deaths == 1 { "time" } else { "times" };
    format!(
        "{}, you died {} {} with {}: {}.",
        summary.display_name(),
        summary.deaths,
        times,
        economy,
        verdict
    )
}
