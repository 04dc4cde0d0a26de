use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::{
    client::{FetchError, MatchSource},
    command::{self, Command},
    critique::CritiqueGenerator,
    dota2::{
        opendota::HeroIndex,
        summary::{self, MatchSummary, Stat, SummaryError},
        AccountId, Side,
    },
    resolver::{self, Criteria},
    store::IdentifierStore,
};

const WELCOME: &str = "Hi! I review your Dota 2 matches.\n\n\
Send /setsteam <Steam32 ID> to link your account,\n\
then /analyze to get a review of your last match.\n\
/match <match_id>:<hero name> reviews a hero in any public match.\n\
Send /profile if you don't know how to make your match data public.";

const PROFILE_HELP: &str = "To let me read your matches, make your Dota 2 match data public:\n\
1. Start Dota 2\n\
2. Open your profile (top of the screen)\n\
3. Go to Settings > Options > Social\n\
4. Enable \"Expose Public Match Data\"\n\n\
Then send /setsteam <your Steam32 ID>.";

#[derive(Serialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    Welcome,
    ProfileHelp,
    Bound,
    InvalidFormat,
    NotBound,
    UpstreamUnavailable,
    NoRecentMatches,
    PlayerNotFound,
    StorageUnavailable,
    Analysis,
    UnknownCommand,
}

#[derive(Serialize, Clone, Debug)]
pub struct Reply {
    pub category: ReplyCategory,
    pub text: String,
}

impl Reply {
    fn new(category: ReplyCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ResolvingIdentity,
    FetchingMatches,
    FetchingDetail,
    ResolvingPlayer,
    Summarizing,
    Critiquing,
    Done,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("NotBound: no account bound and none given")]
    NotBound,
    #[error("UpstreamUnavailable: {0}")]
    Upstream(#[from] FetchError),
    #[error("NoRecentMatches: account has no visible matches")]
    NoRecentMatches,
    #[error("PlayerNotFound: nobody in the match fits the criteria")]
    PlayerNotFound,
    #[error("MalformedPlayer: {0}")]
    Malformed(#[from] SummaryError),
}

#[derive(Error, Debug)]
#[error("analysis failed while {stage:?}: {reason}")]
pub struct Failure {
    pub stage: Stage,
    pub reason: AnalysisError,
}

#[derive(Debug, Clone)]
pub struct Analysis {
    pub summary: MatchSummary,
    pub hero: Option<String>,
    pub side: Side,
    pub critique: String,
}

impl Analysis {
    fn render(&self) -> String {
        let summary = &self.summary;
        let hero = self
            .hero
            .clone()
            .unwrap_or_else(|| format!("hero #{}", summary.hero_id));
        let lane = summary.lane.map(|lane| lane.to_string());
        format!(
            "Match {} | {} ({}): {}\n\
             K/D/A {} | GPM {} | Gold {} | Hero damage {} | Lane {}\n\n\
             {}",
            summary.match_id,
            hero,
            self.side,
            summary.outcome,
            summary.kda(),
            Stat(summary.gold_per_min),
            Stat(summary.gold),
            Stat(summary.hero_damage),
            Stat(lane),
            self.critique
        )
    }
}

// stage bookkeeping for one request
struct Progress<'a> {
    request: &'a str,
    stage: Stage,
}

impl<'a> Progress<'a> {
    fn new(request: &'a str) -> Self {
        Self {
            request,
            stage: Stage::Idle,
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("[{}] {:?} -> {:?}", self.request, self.stage, stage);
        self.stage = stage;
    }

    fn fail(&self, reason: impl Into<AnalysisError>) -> Failure {
        Failure {
            stage: self.stage,
            reason: reason.into(),
        }
    }
}

pub struct Analyzer {
    store: Arc<dyn IdentifierStore>,
    source: Arc<dyn MatchSource>,
    critic: CritiqueGenerator,
    recent_limit: u8,
    // reference data, only kept once fetched successfully
    heroes: OnceCell<HeroIndex>,
}

impl Analyzer {
    pub fn new(
        store: Arc<dyn IdentifierStore>,
        source: Arc<dyn MatchSource>,
        critic: CritiqueGenerator,
        recent_limit: u8,
    ) -> Self {
        Self {
            store,
            source,
            critic,
            recent_limit: recent_limit.max(1),
            heroes: OnceCell::new(),
        }
    }

    pub async fn handle(&self, user_id: &str, text: &str) -> Reply {
        match Command::parse(text) {
            Ok(Command::Start) => Reply::new(ReplyCategory::Welcome, WELCOME),
            Ok(Command::ProfileHelp) => Reply::new(ReplyCategory::ProfileHelp, PROFILE_HELP),
            Ok(Command::Bind(raw)) => self.bind(user_id, &raw).await,
            Ok(Command::Analyze(inline)) => self.analyze(user_id, inline).await,
            Ok(Command::AnalyzeMatch(raw)) => {
                let account = self.store.resolve(user_id).await;
                self.analyze_by_match(&raw, account).await
            }
            Ok(Command::Unknown(name)) => {
                log::debug!("unknown command {:?} from {}", name, user_id);
                Reply::new(
                    ReplyCategory::UnknownCommand,
                    "Unknown command. Send /start to see what I can do.",
                )
            }
            Err(_) => Reply::new(
                ReplyCategory::InvalidFormat,
                "Use the format: /analyze or /analyze 123456789",
            ),
        }
    }

    pub async fn bind(&self, user_id: &str, raw: &str) -> Reply {
        let account = match command::parse_bind(raw) {
            Ok(account) => account,
            Err(_) => {
                return Reply::new(
                    ReplyCategory::InvalidFormat,
                    "Use the format: /setsteam 123456789",
                )
            }
        };
        match self.store.bind(user_id, account).await {
            Ok(()) => Reply::new(
                ReplyCategory::Bound,
                format!("Steam ID saved: {account}\n\nNow you can use /analyze"),
            ),
            Err(err) => {
                log::error!("bind for {} failed: {}", user_id, err);
                Reply::new(
                    ReplyCategory::StorageUnavailable,
                    "Could not save your Steam ID right now, please try again later.",
                )
            }
        }
    }

    pub async fn analyze(&self, user_id: &str, inline: Option<AccountId>) -> Reply {
        match self.analyze_last(user_id, inline).await {
            Ok(analysis) => Reply::new(ReplyCategory::Analysis, analysis.render()),
            Err(failure) => failure_reply(failure),
        }
    }

    // a bound account, if any, is tried before the hero name
    pub async fn analyze_by_match(&self, raw: &str, account: Option<AccountId>) -> Reply {
        let Ok((match_id, hero)) = command::parse_match_ref(raw) else {
            return Reply::new(
                ReplyCategory::InvalidFormat,
                "Use the format: /match 7000000001:Anti-Mage",
            );
        };
        let criteria = Criteria {
            account,
            hero_name: Some(hero),
        };
        let mut progress = Progress::new(raw);
        match self.analyze_match(&mut progress, match_id, &criteria).await {
            Ok(analysis) => Reply::new(ReplyCategory::Analysis, analysis.render()),
            Err(failure) => failure_reply(failure),
        }
    }

    pub async fn analyze_last(
        &self,
        user_id: &str,
        inline: Option<AccountId>,
    ) -> Result<Analysis, Failure> {
        let mut progress = Progress::new(user_id);

        progress.enter(Stage::ResolvingIdentity);
        let account = match inline {
            Some(account) => account,
            None => self
                .store
                .resolve(user_id)
                .await
                .ok_or_else(|| progress.fail(AnalysisError::NotBound))?,
        };

        progress.enter(Stage::FetchingMatches);
        let recent = self
            .source
            .fetch_recent(account, self.recent_limit)
            .await
            .map_err(|err| progress.fail(err))?;
        let latest = recent
            .first()
            .ok_or_else(|| progress.fail(AnalysisError::NoRecentMatches))?;

        self.analyze_match(&mut progress, latest.match_id, &Criteria::account(account))
            .await
    }

    async fn analyze_match(
        &self,
        progress: &mut Progress<'_>,
        match_id: u64,
        criteria: &Criteria,
    ) -> Result<Analysis, Failure> {
        progress.enter(Stage::FetchingDetail);
        let payload = self
            .source
            .fetch_match(match_id)
            .await
            .map_err(|err| progress.fail(err))?;

        progress.enter(Stage::ResolvingPlayer);
        let unknown_heroes = HeroIndex::default();
        let by_account = criteria
            .account
            .and_then(|account| resolver::by_account(&payload, account));
        let (player, heroes) = match (by_account, criteria.hero_name.as_deref()) {
            (Some(player), _) => {
                // names are only cosmetic once the account is found
                let heroes = match self.heroes().await {
                    Ok(heroes) => heroes,
                    Err(err) => {
                        log::warn!("hero list unavailable: {}", err);
                        &unknown_heroes
                    }
                };
                (player, heroes)
            }
            (None, Some(name)) => {
                let heroes = self.heroes().await.map_err(|err| progress.fail(err))?;
                let player = resolver::by_hero(&payload, name, heroes)
                    .ok_or_else(|| progress.fail(AnalysisError::PlayerNotFound))?;
                (player, heroes)
            }
            (None, None) => return Err(progress.fail(AnalysisError::PlayerNotFound)),
        };

        progress.enter(Stage::Summarizing);
        let summary = summary::build(player, payload.match_id).map_err(|err| progress.fail(err))?;

        progress.enter(Stage::Critiquing);
        let critique = self.critic.generate(&summary, payload.match_id).await;

        progress.enter(Stage::Done);
        Ok(Analysis {
            hero: heroes.name_of(summary.hero_id).map(str::to_string),
            side: player.side(),
            summary,
            critique,
        })
    }

    async fn heroes(&self) -> Result<&HeroIndex, FetchError> {
        self.heroes
            .get_or_try_init(|| self.source.fetch_heroes())
            .await
    }
}

fn failure_reply(failure: Failure) -> Reply {
    use ReplyCategory::*;

    let (category, text) = match &failure.reason {
        AnalysisError::NotBound => (
            NotBound,
            "You have not linked a Steam account yet. Send /setsteam <your Steam32 ID> first.",
        ),
        AnalysisError::Upstream(_) | AnalysisError::Malformed(_) => (
            UpstreamUnavailable,
            "The match service is unavailable right now, please try again later.",
        ),
        AnalysisError::NoRecentMatches => (
            NoRecentMatches,
            "No recent matches found. Make sure your match data is public, see /profile.",
        ),
        AnalysisError::PlayerNotFound => (
            PlayerNotFound,
            "Could not find this player or hero in that match.",
        ),
    };
    match category {
        NotBound | PlayerNotFound => log::info!("{}", failure),
        _ => log::warn!("{}", failure),
    }
    Reply::new(category, text)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        critique::{BackendError, ChatMessage, CompletionBackend},
        dota2::{
            opendota::{Hero, MatchPayload, RecentMatch},
            Outcome,
        },
        store::MemoryStore,
    };

    const ACCOUNT: u64 = 90665163;
    const MATCH_ID: u64 = 7000000001;

    #[derive(Clone)]
    enum Answer<T> {
        Ok(T),
        Timeout,
        Status(StatusCode),
    }

    impl<T: Clone> Answer<T> {
        fn get(&self) -> Result<T, FetchError> {
            match self {
                Answer::Ok(value) => Ok(value.clone()),
                Answer::Timeout => Err(FetchError::Timeout),
                Answer::Status(status) => Err(FetchError::NotFound(*status)),
            }
        }
    }

    struct FakeSource {
        recent: Answer<Vec<RecentMatch>>,
        detail: Answer<MatchPayload>,
        heroes: Answer<Vec<Hero>>,
        hero_calls: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                recent: Answer::Ok(vec![RecentMatch { match_id: MATCH_ID }]),
                detail: Answer::Ok(fixture()),
                heroes: Answer::Ok(vec![
                    Hero {
                        id: 1,
                        name: "npc_dota_hero_antimage".to_string(),
                        localized_name: "Anti-Mage".to_string(),
                    },
                    Hero {
                        id: 14,
                        name: "npc_dota_hero_pudge".to_string(),
                        localized_name: "Pudge".to_string(),
                    },
                ]),
                hero_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MatchSource for FakeSource {
        async fn fetch_recent(
            &self,
            account: AccountId,
            _limit: u8,
        ) -> Result<Vec<RecentMatch>, FetchError> {
            assert_eq!(account.get(), ACCOUNT);
            self.recent.get()
        }

        async fn fetch_match(&self, match_id: u64) -> Result<MatchPayload, FetchError> {
            assert_eq!(match_id, MATCH_ID);
            self.detail.get()
        }

        async fn fetch_heroes(&self) -> Result<HeroIndex, FetchError> {
            self.hero_calls.fetch_add(1, Ordering::SeqCst);
            self.heroes.get().map(HeroIndex::new)
        }
    }

    struct QuotaBackend;

    #[async_trait]
    impl CompletionBackend for QuotaBackend {
        async fn complete(&self, _: &[ChatMessage]) -> Result<String, BackendError> {
            Err(BackendError::Status(
                StatusCode::TOO_MANY_REQUESTS,
                "insufficient_quota".to_string(),
            ))
        }
    }

    fn fixture() -> MatchPayload {
        let content = std::fs::read_to_string("./tests/opendota-match.json")
            .expect("Failed to read json");
        serde_json::from_str::<MatchPayload>(&content)
            .expect("Failed to parse json response")
            .normalized()
    }

    fn analyzer(source: FakeSource) -> Analyzer {
        let critic = CritiqueGenerator::new(Some(Arc::new(QuotaBackend)), Duration::from_secs(1));
        Analyzer::new(Arc::new(MemoryStore::new()), Arc::new(source), critic, 1)
    }

    #[tokio::test]
    async fn test_not_bound() {
        let analyzer = analyzer(FakeSource::new());
        let reply = analyzer.handle("alice", "/analyze").await;
        assert_eq!(reply.category, ReplyCategory::NotBound);

        let failure = analyzer.analyze_last("alice", None).await.unwrap_err();
        assert_eq!(failure.stage, Stage::ResolvingIdentity);
    }

    #[tokio::test]
    async fn test_bound_account_last_match() {
        let analyzer = analyzer(FakeSource::new());
        let reply = analyzer.handle("alice", "/setsteam 90665163").await;
        assert_eq!(reply.category, ReplyCategory::Bound);

        let reply = analyzer.handle("alice", "/analyze").await;
        assert_eq!(reply.category, ReplyCategory::Analysis);
        assert!(reply.text.contains("5/3/10"), "{}", reply.text);
        assert!(reply.text.contains("WIN"), "{}", reply.text);
        assert!(reply.text.contains("Anti-Mage (radiant)"), "{}", reply.text);
        // the backend failed, so the deterministic critique is used
        assert!(reply.text.contains("you died 3 times with 612 GPM"), "{}", reply.text);
        assert!(!reply.text.contains("quota"));
    }

    #[tokio::test]
    async fn test_inline_account_skips_store() {
        let analyzer = analyzer(FakeSource::new());
        let reply = analyzer.handle("bob", "/analyze 90665163").await;
        assert_eq!(reply.category, ReplyCategory::Analysis);
    }

    #[tokio::test]
    async fn test_detail_timeout() {
        let mut source = FakeSource::new();
        source.detail = Answer::Timeout;
        let analyzer = analyzer(source);
        analyzer.handle("alice", "/setsteam 90665163").await;

        let reply = analyzer.handle("alice", "/analyze").await;
        assert_eq!(reply.category, ReplyCategory::UpstreamUnavailable);
        assert!(!reply.text.contains("5/3/10"));
        assert!(!reply.text.to_lowercase().contains("timeout"));

        let failure = analyzer.analyze_last("alice", None).await.unwrap_err();
        assert_eq!(failure.stage, Stage::FetchingDetail);
    }

    #[tokio::test]
    async fn test_recent_matches_errors() {
        let mut source = FakeSource::new();
        source.recent = Answer::Status(StatusCode::INTERNAL_SERVER_ERROR);
        let reply = analyzer(source).analyze("alice", Some(AccountId::from(ACCOUNT))).await;
        assert_eq!(reply.category, ReplyCategory::UpstreamUnavailable);

        let mut source = FakeSource::new();
        source.recent = Answer::Ok(vec![]);
        let reply = analyzer(source).analyze("alice", Some(AccountId::from(ACCOUNT))).await;
        assert_eq!(reply.category, ReplyCategory::NoRecentMatches);
    }

    #[tokio::test]
    async fn test_player_missing_from_match() {
        let mut source = FakeSource::new();
        let mut payload = fixture();
        payload.players.retain(|p| !p.is_account(AccountId::from(ACCOUNT)));
        source.detail = Answer::Ok(payload);
        let analyzer = analyzer(source);

        let failure = analyzer
            .analyze_last("alice", Some(AccountId::from(ACCOUNT)))
            .await
            .unwrap_err();
        assert_eq!(failure.stage, Stage::ResolvingPlayer);
        assert!(matches!(failure.reason, AnalysisError::PlayerNotFound));
    }

    #[tokio::test]
    async fn test_missing_kills_is_upstream_problem() {
        let mut source = FakeSource::new();
        let mut payload = fixture();
        payload.players[0].kills = None;
        source.detail = Answer::Ok(payload);
        let analyzer = analyzer(source);

        let reply = analyzer.analyze("alice", Some(AccountId::from(ACCOUNT))).await;
        assert_eq!(reply.category, ReplyCategory::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn test_analyze_by_hero_name() {
        let analyzer = analyzer(FakeSource::new());
        let reply = analyzer.handle("carol", "/match 7000000001:pudge").await;
        assert_eq!(reply.category, ReplyCategory::Analysis);
        assert!(reply.text.contains("3/11/8"), "{}", reply.text);
        assert!(reply.text.contains("LOSS"), "{}", reply.text);

        let reply = analyzer.handle("carol", "/match 7000000001:Invoker").await;
        assert_eq!(reply.category, ReplyCategory::PlayerNotFound);

        let reply = analyzer.handle("carol", "/match pudge").await;
        assert_eq!(reply.category, ReplyCategory::InvalidFormat);
    }

    #[tokio::test]
    async fn test_bound_account_wins_over_hero_name() {
        let analyzer = analyzer(FakeSource::new());
        analyzer.handle("alice", "/setsteam 90665163").await;
        let reply = analyzer.handle("alice", "/match 7000000001:pudge").await;
        assert!(reply.text.contains("5/3/10"), "{}", reply.text);
    }

    #[tokio::test]
    async fn test_hero_list_failure() {
        let mut source = FakeSource::new();
        source.heroes = Answer::Timeout;
        let analyzer = analyzer(source);

        // cosmetic for account lookups
        let reply = analyzer.analyze("alice", Some(AccountId::from(ACCOUNT))).await;
        assert_eq!(reply.category, ReplyCategory::Analysis);
        assert!(reply.text.contains("hero #1"), "{}", reply.text);

        // required for hero lookups
        let reply = analyzer.analyze_by_match("7000000001:pudge", None).await;
        assert_eq!(reply.category, ReplyCategory::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn test_bound_account_survives_hero_list_failure() {
        let mut source = FakeSource::new();
        source.heroes = Answer::Timeout;
        let analyzer = analyzer(source);
        analyzer.handle("alice", "/setsteam 90665163").await;

        let reply = analyzer.handle("alice", "/match 7000000001:pudge").await;
        assert_eq!(reply.category, ReplyCategory::Analysis);
        assert!(reply.text.contains("5/3/10"), "{}", reply.text);
        assert!(reply.text.contains("hero #1"), "{}", reply.text);

        // an account missing from the match still needs the hero list
        let reply = analyzer
            .analyze_by_match("7000000001:pudge", Some(AccountId::from(5)))
            .await;
        assert_eq!(reply.category, ReplyCategory::UpstreamUnavailable);
    }

    #[tokio::test]
    async fn test_hero_list_is_fetched_once() {
        let source = Arc::new(FakeSource::new());
        let critic = CritiqueGenerator::new(None, Duration::from_secs(1));
        let analyzer = Analyzer::new(Arc::new(MemoryStore::new()), source.clone(), critic, 1);
        for _ in 0..3 {
            analyzer.analyze("alice", Some(AccountId::from(ACCOUNT))).await;
        }
        assert_eq!(source.hero_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_bind_leaves_store_unchanged() {
        let analyzer = analyzer(FakeSource::new());
        analyzer.handle("alice", "/setsteam 90665163").await;
        for text in ["/setsteam", "/setsteam abc", "/setsteam 1 2", "/setsteam 12ab"] {
            let reply = analyzer.handle("alice", text).await;
            assert_eq!(reply.category, ReplyCategory::InvalidFormat, "{text:?}");
        }
        assert_eq!(
            analyzer.store.resolve("alice").await,
            Some(AccountId::from(ACCOUNT))
        );
    }

    #[tokio::test]
    async fn test_analysis_is_idempotent() {
        let analyzer = analyzer(FakeSource::new());
        let account = Some(AccountId::from(ACCOUNT));
        let first = analyzer.analyze_last("alice", account).await.unwrap();
        let second = analyzer.analyze_last("alice", account).await.unwrap();
        assert_eq!(first.summary, second.summary);
        assert_eq!(first.summary.outcome, Outcome::Win);
        assert_eq!(first.summary.kda(), "5/3/10");
        assert_eq!(first.summary.last_hits, Some(402));
        assert_eq!(first.summary.xp_per_min, Some(701));
    }

    #[tokio::test]
    async fn test_static_replies() {
        let analyzer = analyzer(FakeSource::new());
        assert_eq!(analyzer.handle("a", "/start").await.category, ReplyCategory::Welcome);
        assert_eq!(analyzer.handle("a", "/profile").await.category, ReplyCategory::ProfileHelp);
        assert_eq!(
            analyzer.handle("a", "what?").await.category,
            ReplyCategory::UnknownCommand
        );
    }
}
