mod analyzer;
mod args;
mod client;
mod command;
mod critique;
mod dota2;
mod resolver;
mod service;
mod store;

use std::{sync::Arc, time::Duration};

use analyzer::Analyzer;
use args::Args;
use clap::Parser;
use client::{Client, RetryPolicy};
use critique::{openai::OpenAiConfig, CompletionBackend, CritiqueGenerator, OpenAiBackend};
use service::AppState;
use store::{FileStore, IdentifierStore, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    let store: Arc<dyn IdentifierStore> = match &args.store {
        Some(path) => Arc::new(FileStore::open(path).await?),
        None => {
            log::warn!("no --store given, bindings are lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let retry = if args.retry_on_timeout {
        RetryPolicy::OnceOnTimeout {
            delay: Duration::from_secs(1),
        }
    } else {
        RetryPolicy::Never
    };
    let client = Client::new(
        &args.opendota_url,
        args.proxy.as_deref(),
        Duration::from_secs(args.fetch_timeout),
        retry,
    )?;

    let critique_timeout = Duration::from_secs(args.critique_timeout);
    let backend: Option<Arc<dyn CompletionBackend>> = match &args.openai_key {
        Some(key) => Some(Arc::new(OpenAiBackend::new(OpenAiConfig {
            base_url: args.openai_url.clone(),
            api_key: key.clone(),
            model: args.model.clone(),
            temperature: args.temperature,
            max_tokens: args.max_tokens,
            timeout: critique_timeout,
        })?)),
        None => {
            log::warn!("OPENAI_API_KEY not set, critiques use the fallback template");
            None
        }
    };

    let analyzer = Analyzer::new(
        store,
        Arc::new(client),
        CritiqueGenerator::new(backend, critique_timeout),
        args.recent_limit,
    );
    let state = Arc::new(AppState::new(analyzer));

    let listen = args.listen;
    service::supervise(args.max_restarts, Duration::from_secs(1), || {
        service::serve(listen, state.clone())
    })
    .await
}
