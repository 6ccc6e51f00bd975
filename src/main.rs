mod accounts;
mod commands;
mod config;
mod conversation;
mod error;
mod history;
mod llm;
mod storage;
mod streaming;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::Config;
use std::sync::Arc;
use storage::{FileStore, KeyValueStore, MemoryStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "yuno")]
#[command(version)]
#[command(about = "Yuno campus assistant in your terminal", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Keep history and accounts in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Ask a single question
    Ask {
        prompt: Vec<String>,
        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },
    /// Manage past conversations
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },
    /// Create a local account
    Register { email: String, password: String },
    /// Check local account credentials
    Login { email: String, password: String },
    /// Store the API key in ~/.yuno/config.toml
    SetKey { key: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List entries, newest first
    List,
    /// Delete an entry by number or id
    Remove { selector: String },
    /// Delete every entry
    Clear,
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load()?;
    info!("Using endpoint {} with model {}", config.endpoint, config.model);

    let store: Arc<dyn KeyValueStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let file_store = FileStore::new(config.store_path());
        info!("Using store {}", file_store.path().display());
        Arc::new(file_store)
    };
    let history = history::HistoryStore::new(Arc::clone(&store))
        .with_title_len(config.history_title_len);
    let accounts = accounts::AccountStore::new(Arc::clone(&store));

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let client = llm::LlmClient::new(&config);
            ui::ChatRepl::new(client, history).run().await?;
        }
        Commands::Ask { prompt, no_stream } => {
            let client = llm::LlmClient::new(&config);
            let stream = config.stream && !no_stream;
            commands::ask(&client, &history, &prompt.join(" "), stream).await?;
        }
        Commands::History { action } => match action.unwrap_or(HistoryAction::List) {
            HistoryAction::List => commands::list_history(&history)?,
            HistoryAction::Remove { selector } => commands::remove_history(&history, &selector)?,
            HistoryAction::Clear => commands::clear_history(&history)?,
        },
        Commands::Register { email, password } => commands::register(&accounts, &email, &password)?,
        Commands::Login { email, password } => commands::login(&accounts, &email, &password)?,
        Commands::SetKey { key } => commands::set_api_key(&mut config, key)?,
    }

    Ok(())
}
