use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

use crate::client::Client;

#[derive(Parser)]
#[command(name = "dota2-match-coach")]
#[command(about = "Chat bot backend reviewing your last Dota 2 match")]
pub struct Args {
    #[arg(long, env = "COACH_LISTEN", default_value = "127.0.0.1:8080")]
    pub listen: SocketAddr,
    /// bindings file, bindings are kept in memory only when absent
    #[arg(long, env = "COACH_STORE")]
    pub store: Option<PathBuf>,
    #[arg(long, default_value = Client::DEFAULT_URL)]
    pub opendota_url: String,
    #[arg(long)]
    pub proxy: Option<String>,
    /// seconds
    #[arg(long, default_value_t = 15)]
    pub fetch_timeout: u64,
    /// retry a timed out OpenDota request once
    #[arg(long)]
    pub retry_on_timeout: bool,
    #[arg(long, default_value_t = 1)]
    pub recent_limit: u8,
    /// critiques fall back to a fixed template without a key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_key: Option<String>,
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_url: String,
    #[arg(long, env = "COACH_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,
    #[arg(long, default_value_t = 400)]
    pub max_tokens: u32,
    /// seconds
    #[arg(long, default_value_t = 20)]
    pub critique_timeout: u64,
    /// how often the server is restarted after a crash before giving up
    #[arg(long, default_value_t = 5)]
    pub max_restarts: usize,
}
