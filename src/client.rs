use std::{future::Future, time::Duration};

use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use reqwest::{Proxy, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::dota2::{
    opendota::{Hero, HeroIndex, MatchPayload, RecentMatch},
    AccountId,
};

// we use separate error types for construction and request

#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error("ProxyError: {0} from scheme: {1}.")]
    ProxyError(reqwest::Error, String),
    #[error("BuildError: {0}.")]
    BuildError(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("NotFound: web API answered {0}")]
    NotFound(StatusCode),
    #[error("Timeout: web API did not answer in time")]
    Timeout,
    #[error("Malformed: failed to decode web API response: {0}")]
    Malformed(serde_json::Error, String),
    #[error("Failed to retrive result from web API: {0}")]
    Connection(reqwest::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else {
            Self::Connection(value)
        }
    }
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    Never,
    OnceOnTimeout { delay: Duration },
}

pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    match policy {
        RetryPolicy::Never => op().await,
        RetryPolicy::OnceOnTimeout { delay } => {
            op.retry(
                ConstantBuilder::default()
                    .with_delay(delay)
                    .with_max_times(1),
            )
            .when(FetchError::is_timeout)
            .notify(|_, dur| log::warn!("request timed out, retrying in {}ms", dur.as_millis()))
            .await
        }
    }
}

#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_recent(
        &self,
        account: AccountId,
        limit: u8,
    ) -> Result<Vec<RecentMatch>, FetchError>;

    async fn fetch_match(&self, match_id: u64) -> Result<MatchPayload, FetchError>;

    async fn fetch_heroes(&self) -> Result<HeroIndex, FetchError>;
}

pub struct Client {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl Client {
    pub const DEFAULT_URL: &str = "https://api.opendota.com/api";

    pub fn new(
        base_url: &str,
        proxy: Option<&str>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ConstructionError> {
        let builder = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)));
        let builder = match proxy {
            Some(proxy) => {
                let proxy = Proxy::all(proxy)
                    .map_err(|err| ConstructionError::ProxyError(err, proxy.to_string()))?;
                builder.proxy(proxy)
            }
            None => builder,
        };
        let client = builder.build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);
        let resp = self.client.get(&url).query(query).send().await?;
        match resp.status() {
            status if status.is_success() => {
                let content = resp.text().await?;
                serde_json::from_str(&content).map_err(|err| FetchError::Malformed(err, content))
            }
            other => Err(FetchError::NotFound(other)),
        }
    }
}

#[async_trait]
impl MatchSource for Client {
    async fn fetch_recent(
        &self,
        account: AccountId,
        limit: u8,
    ) -> Result<Vec<RecentMatch>, FetchError> {
        let path = format!("/players/{}/recentMatches", account);
        let query = [("limit", limit.to_string())];
        with_retry(self.retry, || self.get_json(&path, &query)).await
    }

    async fn fetch_match(&self, match_id: u64) -> Result<MatchPayload, FetchError> {
        let path = format!("/matches/{}", match_id);
        with_retry(self.retry, || self.get_json::<MatchPayload>(&path, &[]))
            .await
            .map(MatchPayload::normalized)
    }

    async fn fetch_heroes(&self) -> Result<HeroIndex, FetchError> {
        with_retry(self.retry, || self.get_json::<Vec<Hero>>("/heroes", &[]))
            .await
            .map(HeroIndex::new)
    }
}
