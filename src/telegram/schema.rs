//! Dispatcher schema and handler chain builders

use std::sync::Arc;

use teloxide::dispatching::{HandlerExt, UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, Message};

use crate::admin::update::UpdateQueue;
use crate::session::SessionStore;
use crate::storage::db::DbPool;
use crate::telegram::bot::Command;
use crate::telegram::veto::VetoStep;
use crate::telegram::veto_callbacks::VetoAction;
use crate::telegram::vouch::VouchStep;
use crate::telegram::vouch_callbacks::VouchAction;
use crate::core::config;
use crate::telegram::notice::send_ephemeral;
use crate::telegram::{commands, veto, veto_callbacks, vote, vouch, vouch_callbacks};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shown when a handler fails unexpectedly; the session, if any, stays
/// at its current step so the user can retry or cancel.
const RETRY_TEXT: &str = "Something went wrong. Try again, or type \"cancel\" to start over.";

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub db_pool: Arc<DbPool>,
    pub vouch_sessions: Arc<SessionStore<VouchStep>>,
    pub veto_sessions: Arc<SessionStore<VetoStep>>,
    pub update_queue: Arc<UpdateQueue>,
}

impl HandlerDeps {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            db_pool,
            vouch_sessions: Arc::new(SessionStore::new()),
            veto_sessions: Arc::new(SessionStore::new()),
            update_queue: Arc::new(UpdateQueue::new()),
        }
    }
}

/// Creates the main dispatcher schema for the bot.
///
/// The same handler tree is used in production and in integration tests.
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_remove = deps.clone();
    let deps_wizard = deps.clone();
    let deps_callback = deps.clone();

    dptree::entry()
        .branch(command_handler(deps_commands))
        .branch(remove_reply_handler(deps_remove))
        .branch(wizard_message_handler(deps_wizard))
        .branch(callback_handler(deps_callback))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter_command::<Command>()
        .endpoint(move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                if let Err(e) = commands::handle_command(
                    &bot,
                    &deps.db_pool,
                    &deps.vouch_sessions,
                    &deps.veto_sessions,
                    &deps.update_queue,
                    &msg,
                    cmd,
                )
                .await
                {
                    log::error!("Command handler failed: {}", e);
                    send_ephemeral(&bot, msg.chat.id, RETRY_TEXT, config::notice::usage_delete())
                        .await;
                }
                Ok(())
            }
        })
}

/// Creator reply "x" removes a tracked vouch.
fn remove_reply_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| {
            msg.text().map(str::trim) == Some("x") && msg.reply_to_message().is_some()
        })
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                if let Err(e) = commands::handle_remove_reply(&bot, &deps.db_pool, &msg).await {
                    log::error!("Remove handler failed: {}", e);
                    send_ephemeral(&bot, msg.chat.id, RETRY_TEXT, config::notice::usage_delete())
                        .await;
                }
                Ok(())
            }
        })
}

/// Free-form messages feed whichever wizard the sender has active.
fn wizard_message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .endpoint(move |bot: Bot, msg: Message| {
            let deps = deps.clone();
            async move {
                match vouch::handle_wizard_message(&bot, &deps.db_pool, &deps.vouch_sessions, &msg)
                    .await
                {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(e) => {
                        log::error!("Vouch wizard failed: {}", e);
                        send_ephemeral(&bot, msg.chat.id, RETRY_TEXT, config::notice::usage_delete())
                            .await;
                        return Ok(());
                    }
                }
                if let Err(e) =
                    veto::handle_wizard_message(&bot, &deps.db_pool, &deps.veto_sessions, &msg).await
                {
                    log::error!("Veto wizard failed: {}", e);
                    send_ephemeral(&bot, msg.chat.id, RETRY_TEXT, config::notice::usage_delete())
                        .await;
                }
                Ok(())
            }
        })
}

fn callback_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_callback_query().endpoint(move |bot: Bot, query: CallbackQuery| {
        let deps = deps.clone();
        async move {
            let Some(data) = query.data.clone() else {
                return Ok(());
            };

            let result = if let Some(action) = VouchAction::parse(&data) {
                vouch_callbacks::handle_vouch_callback(
                    &bot,
                    &deps.db_pool,
                    &deps.vouch_sessions,
                    &query,
                    action,
                )
                .await
            } else if let Some(action) = VetoAction::parse(&data) {
                veto_callbacks::handle_veto_callback(
                    &bot,
                    &deps.db_pool,
                    &deps.veto_sessions,
                    &query,
                    action,
                )
                .await
            } else if let Some((kind, direction)) = vote::parse_vote(&data) {
                vote::handle_vote_callback(&bot, &deps.db_pool, &query, kind, direction).await
            } else if data.starts_with("start:") {
                commands::handle_start_callback(
                    &bot,
                    &deps.db_pool,
                    &deps.veto_sessions,
                    &query,
                    &data,
                )
                .await
            } else {
                log::debug!("Unhandled callback data: {}", data);
                Ok(())
            };

            if let Err(e) = result {
                log::error!("Callback handler failed: {}", e);
                if let Some(chat_id) = query.message.as_ref().map(|m| m.chat().id) {
                    send_ephemeral(&bot, chat_id, RETRY_TEXT, config::notice::usage_delete())
                        .await;
                }
            }
            Ok(())
        }
    })
}
