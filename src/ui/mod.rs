//! Terminal chat front-end

pub mod chat;
pub mod commands;
pub mod history;

pub use chat::ChatRepl;
