//! In-memory state of the active chat: the ordered message list, the buffer
//! of the reply currently streaming in, and the single in-flight request
//! guard.

use crate::error::ConversationError;
use crate::history::HistoryStore;
use crate::llm::LlmClient;
use crate::storage::KeyValueStore;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tracing::debug;
use uuid::Uuid;

pub const GREETING: &str = "Lost at PFH? Don't worry, Yuno's got your back! How can I assist you?";

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    #[allow(dead_code)]
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }
}

/// Messages of one chat session; nothing here outlives the value.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    streaming_buffer: String,
    in_flight: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Welcome line shown before the first message; never part of the list
    pub fn greeting() -> &'static str {
        GREETING
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Partial assistant reply received so far
    #[allow(dead_code)]
    pub fn streaming_buffer(&self) -> &str {
        &self.streaming_buffer
    }

    #[allow(dead_code)]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Accept a user message and mark a request as outstanding
    pub fn begin_send(&mut self, prompt: &str) -> Result<&Message, ConversationError> {
        if self.in_flight {
            return Err(ConversationError::Busy);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ConversationError::EmptyPrompt);
        }

        self.in_flight = true;
        self.streaming_buffer.clear();
        self.messages.push(Message::new(Role::User, prompt));
        Ok(&self.messages[self.messages.len() - 1])
    }

    #[allow(dead_code)]
    pub fn push_chunk(&mut self, chunk: &str) {
        if self.in_flight {
            self.streaming_buffer.push_str(chunk);
        }
    }

    /// Fold the finished reply into the message list and release the guard
    pub fn finish_send(&mut self, reply: String) -> &Message {
        self.streaming_buffer.clear();
        self.in_flight = false;
        self.messages.push(Message::new(Role::Assistant, reply));
        &self.messages[self.messages.len() - 1]
    }

    /// Send `prompt`, record it in the history and wait for the full reply.
    ///
    /// Each streamed fragment is buffered and passed to `on_chunk`. The reply
    /// is appended as a single assistant message once the request ends, with
    /// the fallback text when it failed.
    pub async fn send<S, F>(
        &mut self,
        client: &LlmClient,
        history: &HistoryStore<S>,
        prompt: &str,
        mut on_chunk: F,
    ) -> Result<Message, ConversationError>
    where
        S: KeyValueStore,
        F: FnMut(&str),
    {
        let prompt = self.begin_send(prompt)?.content.clone();
        history.record(&prompt);

        let reply = if client.streams() {
            let buffer = &mut self.streaming_buffer;
            client
                .ask_streaming(&prompt, |chunk| {
                    buffer.push_str(chunk);
                    on_chunk(chunk);
                })
                .await
        } else {
            client.ask(&prompt).await
        };

        let reply = if reply.is_empty() {
            client.fallback_reply().to_string()
        } else {
            reply
        };

        debug!("Reply complete ({} bytes)", reply.len());
        Ok(self.finish_send(reply).clone())
    }

    /// Forget every message
    pub fn reset(&mut self) {
        if !self.in_flight {
            self.messages.clear();
            self.streaming_buffer.clear();
        }
    }
}
