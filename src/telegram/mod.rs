//! Telegram bot integration and handlers

pub mod access;
pub mod bot;
pub mod caption;
pub mod commands;
pub mod notice;
pub mod schema;
pub mod veto;
pub mod veto_callbacks;
pub mod vote;
pub mod vouch;
pub mod vouch_callbacks;

pub use schema::{schema, HandlerDeps, HandlerError};
