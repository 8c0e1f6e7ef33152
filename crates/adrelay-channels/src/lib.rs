//! # AdRelay Channels
//! Messaging network implementations.

pub mod telegram;

pub use telegram::{TelegramConfig, TelegramFactory, TelegramTransport};
