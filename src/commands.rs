use crate::accounts::AccountStore;
use crate::config::Config;
use crate::error::AccountError;
use crate::history::HistoryStore;
use crate::llm::LlmClient;
use crate::storage::KeyValueStore;
use crate::ui::history::{render_history, resolve_entry};
use anyhow::{Context, Result};
use std::io::{self, Write};
use tracing::error;

pub async fn ask<S: KeyValueStore>(
    client: &LlmClient,
    history: &HistoryStore<S>,
    prompt: &str,
    stream: bool,
) -> Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        println!("❌ Please enter a question.");
        return Ok(());
    }
    history.record(prompt);

    if stream {
        let mut stdout = io::stdout();
        let mut printed = String::new();
        let reply = client
            .ask_streaming(prompt, |chunk| {
                printed.push_str(chunk);
                let _ = stdout.write_all(chunk.as_bytes());
                let _ = stdout.flush();
            })
            .await;
        if printed != reply {
            if !printed.is_empty() {
                println!();
            }
            print!("{}", reply);
        }
        println!();
    } else {
        println!("{}", client.ask(prompt).await);
    }

    Ok(())
}

pub fn list_history<S: KeyValueStore>(history: &HistoryStore<S>) -> Result<()> {
    println!("🕒 History");
    println!("{}", "=".repeat(50));
    println!("{}", render_history(&history.list()));
    Ok(())
}

pub fn remove_history<S: KeyValueStore>(history: &HistoryStore<S>, selector: &str) -> Result<()> {
    let entry = history
        .get(selector)
        .or_else(|| resolve_entry(&history.list(), selector).cloned());
    match entry {
        Some(entry) if history.remove(&entry.id) => println!("🗑️  Deleted \"{}\"", entry.title),
        Some(entry) => println!("❌ Could not delete \"{}\"", entry.title),
        None => println!("📭 No history entry matches '{}'.", selector),
    }
    Ok(())
}

pub fn clear_history<S: KeyValueStore>(history: &HistoryStore<S>) -> Result<()> {
    if history.clear() {
        println!("✨ History cleared.");
    } else {
        println!("❌ Could not clear history.");
    }
    Ok(())
}

pub fn register<S: KeyValueStore>(accounts: &AccountStore<S>, email: &str, password: &str) -> Result<()> {
    match accounts.register(email, password) {
        Ok(user) => {
            println!("✅ Account created for {}. You can now log in.", user.email);
            Ok(())
        }
        Err(AccountError::Store(e)) => {
            error!("Error saving users: {}", e);
            println!("❌ Could not save your account. Please try again.");
            Ok(())
        }
        Err(e) => {
            println!("❌ {}", e);
            Ok(())
        }
    }
}

pub fn login<S: KeyValueStore>(accounts: &AccountStore<S>, email: &str, password: &str) -> Result<()> {
    match accounts.login(email, password) {
        Ok(user) => println!("🎓 Welcome back, {}!", user.email),
        Err(e) => println!("❌ {}", e),
    }
    Ok(())
}

pub fn set_api_key(config: &mut Config, key: String) -> Result<()> {
    let key = key.trim().to_string();
    if key.is_empty() {
        println!("❌ The API key must not be empty.");
        return Ok(());
    }
    config.set_api_key(key);
    config.save().context("Failed to store API key")?;
    println!("🔑 API key saved to {}", config.yuno_home.join("config.toml").display());
    Ok(())
}
