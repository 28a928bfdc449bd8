//! Mosaic Chatbot - ask natural-language questions about a MySQL database.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chain::ChatChain;
use gateway::ConnectionParameters;
use model::OllamaModel;
use session::ChatSession;

mod chain;
mod gateway;
mod model;
mod prompts;
mod session;

#[derive(Parser, Debug)]
#[command(name = "mosaic-chatbot", version, about)]
struct Args {
    /// Database host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Database port
    #[arg(long, default_value = "3306")]
    port: String,

    /// Database name
    #[arg(long, default_value = "chinook")]
    database: String,

    /// Database user
    #[arg(long, default_value = "root")]
    user: String,

    /// Database password; can also be set in-session with /set password
    #[arg(long, default_value = "")]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mosaic_chatbot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let params = ConnectionParameters {
        host: args.host,
        port: args.port,
        database: args.database,
        user: args.user,
        password: args.password,
    };

    let model = Arc::new(OllamaModel::from_env()?);
    let session = ChatSession::new(params, ChatChain::new(model));

    session::run(session).await
}
