use crate::conversation::Conversation;
use crate::history::HistoryStore;
use crate::llm::LlmClient;
use crate::storage::KeyValueStore;
use crate::ui::commands::{get_help_text, parse_slash_command, ParsedCommand, SlashCommand};
use crate::ui::history::{render_history, resolve_entry};
use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

/// What the loop should do after handling a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Continue,
    Exit,
}

/// Line-oriented chat front-end over a [`Conversation`]
pub struct ChatRepl<S> {
    client: LlmClient,
    history: HistoryStore<S>,
    conversation: Conversation,
}

impl<S: KeyValueStore> ChatRepl<S> {
    pub fn new(client: LlmClient, history: HistoryStore<S>) -> Self {
        Self {
            client,
            history,
            conversation: Conversation::new(),
        }
    }

    #[allow(dead_code)]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Run on the process's stdin/stdout until `/bye` or end of input
    pub async fn run(&mut self) -> Result<()> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut stdout = std::io::stdout();
        self.run_with(stdin, &mut stdout).await
    }

    pub async fn run_with<R, W>(&mut self, input: R, output: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(output, "YUNO: {}", Conversation::greeting())?;
        writeln!(output, "(type /help for commands)")?;

        let mut lines = input.lines();
        loop {
            write!(output, "\nyou> ")?;
            output.flush()?;

            let Some(line) = lines.next_line().await.context("Failed to read input")? else {
                writeln!(output)?;
                break;
            };

            if self.handle_line(&line, output).await? == ChatAction::Exit {
                break;
            }
        }

        info!("Chat ended after {} messages", self.conversation.messages().len());
        Ok(())
    }

    /// Handle a single line of user input
    pub async fn handle_line<W: Write>(&mut self, line: &str, output: &mut W) -> Result<ChatAction> {
        if line.trim().is_empty() {
            return Ok(ChatAction::Continue);
        }

        if let Some(command) = parse_slash_command(line) {
            return self.handle_command(command, output);
        }
        if line.trim_start().starts_with('/') {
            writeln!(output, "Unknown command. Type /help for a list.")?;
            return Ok(ChatAction::Continue);
        }

        write!(output, "YUNO: ")?;
        output.flush()?;

        let mut printed = String::new();
        let mut write_failed = false;
        let result = self
            .conversation
            .send(&self.client, &self.history, line, |chunk| {
                printed.push_str(chunk);
                if output.write_all(chunk.as_bytes()).and_then(|_| output.flush()).is_err() {
                    write_failed = true;
                }
            })
            .await;

        if write_failed {
            warn!("Could not write streamed reply to output");
        }

        match result {
            Ok(reply) => {
                // Non-streamed and fallback replies never pass through the callback.
                if printed != reply.content {
                    if !printed.is_empty() {
                        writeln!(output)?;
                    }
                    write!(output, "{}", reply.content)?;
                }
                writeln!(output)?;
            }
            Err(e) => writeln!(output, "{}", e)?,
        }

        Ok(ChatAction::Continue)
    }

    fn handle_command<W: Write>(&mut self, parsed: ParsedCommand, output: &mut W) -> Result<ChatAction> {
        match parsed.command {
            SlashCommand::History => {
                writeln!(output, "History\n{}", render_history(&self.history.list()))?;
            }
            SlashCommand::Delete => {
                let Some(selector) = parsed.argument() else {
                    writeln!(output, "Usage: /delete <number|id>")?;
                    return Ok(ChatAction::Continue);
                };
                let entries = self.history.list();
                match resolve_entry(&entries, selector) {
                    Some(entry) if self.history.remove(&entry.id) => {
                        writeln!(output, "Deleted \"{}\"", entry.title)?;
                    }
                    Some(entry) => writeln!(output, "Could not delete \"{}\"", entry.title)?,
                    None => writeln!(output, "No history entry matches {}", selector)?,
                }
            }
            SlashCommand::ClearHistory => {
                if self.history.clear() {
                    writeln!(output, "History cleared")?;
                } else {
                    writeln!(output, "Could not clear history")?;
                }
            }
            SlashCommand::New => {
                self.conversation.reset();
                writeln!(output, "YUNO: {}", Conversation::greeting())?;
            }
            SlashCommand::Help => writeln!(output, "{}", get_help_text())?,
            SlashCommand::Bye => return Ok(ChatAction::Exit),
        }

        Ok(ChatAction::Continue)
    }
}
