//! Bot initialization and command definitions

use reqwest::ClientBuilder;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::core::config;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "show the main menu")]
    Start,
    #[command(description = "how the bot works")]
    Help,
    #[command(description = "vouch for an account")]
    Vouch,
    #[command(description = "report an account (DM only)")]
    Veto,
    #[command(description = "list the reports you submitted (DM only)")]
    List,
    #[command(description = "republish a vote message (reply to it)")]
    Up,
    #[command(description = "retarget a vouch to a new handle (admins only)")]
    Editx,
    #[command(description = "set vote thresholds (admins only)")]
    Set,
    #[command(description = "show current vote thresholds (admins only)")]
    Viewsettings,
    #[command(description = "recompute record statuses (admins only)")]
    Update,
    #[command(description = "show the update queue state (admins only)")]
    Updatestatus,
}

/// Creates a Bot instance with a request timeout applied.
pub fn create_bot() -> anyhow::Result<Bot> {
    let client = ClientBuilder::new().timeout(config::network::timeout()).build()?;
    let bot = if config::BOT_TOKEN.is_empty() {
        Bot::from_env_with_client(client)
    } else {
        Bot::with_client(config::BOT_TOKEN.as_str(), client)
    };
    Ok(bot)
}

/// Sets up bot commands in the Telegram UI. Admin commands stay hidden.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    use teloxide::types::BotCommand;

    bot.set_my_commands(vec![
        BotCommand::new("start", "show the main menu"),
        BotCommand::new("help", "how the bot works"),
        BotCommand::new("vouch", "vouch for an account"),
        BotCommand::new("veto", "report an account (DM only)"),
        BotCommand::new("list", "list the reports you submitted (DM only)"),
        BotCommand::new("up", "republish a vote message (reply to it)"),
    ])
    .await?;

    Ok(())
}
