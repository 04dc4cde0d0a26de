use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};

use crate::analyzer::{Analyzer, Reply};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommandEvent {
    pub user_id: String,
    pub text: String,
}

pub struct AppState {
    analyzer: Analyzer,
}

impl AppState {
    pub fn new(analyzer: Analyzer) -> Self {
        Self { analyzer }
    }
}

// if the gateway hangs up, axum drops this future and every pending
// upstream call with it, nothing is half sent
pub async fn handle_command(
    State(state): State<Arc<AppState>>,
    Json(event): Json<CommandEvent>,
) -> Json<Reply> {
    log::debug!("command from {}: {:?}", event.user_id, event.text);
    let reply = state.analyzer.handle(&event.user_id, &event.text).await;
    Json(reply)
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/command", post(handle_command))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// restarts `run` with backoff at most `max_restarts` times, then hands back its error
pub async fn supervise<F, Fut>(
    max_restarts: usize,
    min_delay: Duration,
    run: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    run.retry(
        ExponentialBuilder::default()
            .with_min_delay(min_delay)
            .with_max_delay(Duration::from_secs(60))
            .with_max_times(max_restarts),
    )
    .notify(|err, dur| {
        log::error!("server stopped: {:?}, restarting in {}ms", err, dur.as_millis())
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        analyzer::ReplyCategory,
        client::{FetchError, MatchSource},
        critique::CritiqueGenerator,
        dota2::{
            opendota::{HeroIndex, MatchPayload, RecentMatch},
            AccountId,
        },
        store::MemoryStore,
    };

    struct Offline;

    #[async_trait]
    impl MatchSource for Offline {
        async fn fetch_recent(&self, _: AccountId, _: u8) -> Result<Vec<RecentMatch>, FetchError> {
            Err(FetchError::Timeout)
        }

        async fn fetch_match(&self, _: u64) -> Result<MatchPayload, FetchError> {
            Err(FetchError::Timeout)
        }

        async fn fetch_heroes(&self) -> Result<HeroIndex, FetchError> {
            Err(FetchError::Timeout)
        }
    }

    fn state() -> Arc<AppState> {
        let analyzer = Analyzer::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Offline),
            CritiqueGenerator::new(None, Duration::from_secs(1)),
            1,
        );
        Arc::new(AppState::new(analyzer))
    }

    fn event(user_id: &str, text: &str) -> Json<CommandEvent> {
        Json(CommandEvent {
            user_id: user_id.to_string(),
            text: text.to_string(),
        })
    }

    #[tokio::test]
    async fn test_handle_command() {
        let state = state();
        let Json(reply) = handle_command(State(state.clone()), event("7", "/setsteam 1")).await;
        assert_eq!(reply.category, ReplyCategory::Bound);
        let Json(reply) = handle_command(State(state.clone()), event("7", "/analyze")).await;
        assert_eq!(reply.category, ReplyCategory::UpstreamUnavailable);
        let Json(reply) = handle_command(State(state), event("8", "/analyze")).await;
        assert_eq!(reply.category, ReplyCategory::NotBound);
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = Reply {
            category: ReplyCategory::PlayerNotFound,
            text: "nope".to_string(),
        };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["category"], "player_not_found");
        assert_eq!(json["text"], "nope");
    }

    async fn crash(calls: &AtomicUsize, failures: usize) -> anyhow::Result<()> {
        if calls.fetch_add(1, Ordering::SeqCst) < failures {
            anyhow::bail!("accept failed");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_supervise_is_bounded() {
        let calls = AtomicUsize::new(0);
        let result = supervise(3, Duration::from_millis(1), || crash(&calls, usize::MAX)).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_supervise_recovers() {
        let calls = AtomicUsize::new(0);
        let result = supervise(3, Duration::from_millis(1), || crash(&calls, 1)).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
