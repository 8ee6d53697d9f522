//! Safeguard: a Telegram bot that lets a community vouch for and veto
//! accounts through guided wizards and public vote messages.

pub mod admin;
pub mod cli;
pub mod core;
pub mod profile;
pub mod records;
pub mod session;
pub mod storage;
pub mod telegram;
