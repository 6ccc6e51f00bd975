//! Error types shared across the client, the stores and the conversation state.

use thiserror::Error;

/// Failures talking to the completion endpoint.
///
/// These never reach the screen layer: [`crate::llm::LlmClient`] logs them
/// and answers with the configured fallback reply instead.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response is missing `{0}`")]
    MissingField(&'static str),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response stream failed: {0}")]
    Stream(String),

    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("No API key configured (set OPENAI_API_KEY or api_key in config.toml)")]
    MissingApiKey,
}

/// Failures of the local key-value store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored data is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Message is empty")]
    EmptyPrompt,

    #[error("A reply is still being generated")]
    Busy,
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Please use your PFH email (must end with {0})")]
    InvalidEmail(&'static str),

    #[error("Password must be at least {0} characters")]
    WeakPassword(usize),

    #[error("An account for {0} already exists")]
    AlreadyRegistered(String),

    #[error("No account found for {0}")]
    UnknownUser(String),

    #[error("Wrong password")]
    WrongPassword,

    #[error(transparent)]
    Store(#[from] StoreError),
}
