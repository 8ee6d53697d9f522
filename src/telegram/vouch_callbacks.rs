//! Callback routing for the vouch wizard buttons.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;

use crate::core::config;
use crate::core::error::AppResult;
use crate::session::SessionStore;
use crate::storage::db::DbPool;
use crate::telegram::caption;
use crate::telegram::vouch::{
    self, cancel_wizard, finalize_vouch, show_review_screen, VouchStep,
};

/// Button actions of the vouch wizard, parsed from callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VouchAction {
    Cancel,
    EditUser,
    ConfirmUser,
    SkipDescription,
    EditDescription,
    Submit,
}

impl VouchAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "vouch:cancel" => Some(Self::Cancel),
            "vouch:edit_user" => Some(Self::EditUser),
            "vouch:confirm_user" => Some(Self::ConfirmUser),
            "vouch:skip_description" => Some(Self::SkipDescription),
            "vouch:edit_description" => Some(Self::EditDescription),
            "vouch:submit" => Some(Self::Submit),
            _ => None,
        }
    }
}

/// Handles a vouch wizard button press. Every (action, step) pair is
/// matched explicitly; stale buttons from an earlier screen answer with
/// a toast instead of corrupting the wizard.
pub async fn handle_vouch_callback(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VouchStep>,
    query: &CallbackQuery,
    action: VouchAction,
) -> AppResult<()> {
    let user = &query.from;
    let Some(session) = sessions.get(user.id).await else {
        bot.answer_callback_query(query.id.clone())
            .text("This wizard has expired. Start again with /vouch.")
            .await?;
        return Ok(());
    };

    match (action, session.step.clone()) {
        (VouchAction::Cancel, _) => {
            bot.answer_callback_query(query.id.clone()).await?;
            cancel_wizard(bot, sessions, user.id).await;
        }
        (VouchAction::EditUser, _) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| s.step = VouchStep::Username)
                .await
                .unwrap_or(session);
            vouch::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                "Who are you vouching for? Send an X handle or profile link.",
                caption::wizard_cancel_keyboard("vouch"),
            )
            .await?;
        }
        (VouchAction::ConfirmUser, VouchStep::AwaitConfirm { target }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| s.step = VouchStep::Description { target: target.clone() })
                .await
                .unwrap_or(session);
            vouch::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                &format!(
                    "Add a short description for @{} (up to {} characters), or skip.",
                    target.subject,
                    config::session::MAX_DESCRIPTION_LEN
                ),
                caption::vouch_description_keyboard(),
            )
            .await?;
        }
        (VouchAction::SkipDescription, VouchStep::Description { target }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| {
                    s.step = VouchStep::Review {
                        target: target.clone(),
                        description: None,
                    }
                })
                .await
                .unwrap_or(session);
            show_review_screen(bot, db_pool, sessions, user, &session, &target, None).await?;
        }
        (VouchAction::EditDescription, VouchStep::Review { target, .. }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| s.step = VouchStep::Description { target: target.clone() })
                .await
                .unwrap_or(session);
            vouch::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                &format!(
                    "Send a new description for @{} (up to {} characters), or skip.",
                    target.subject,
                    config::session::MAX_DESCRIPTION_LEN
                ),
                caption::vouch_description_keyboard(),
            )
            .await?;
        }
        (VouchAction::Submit, VouchStep::Review { .. }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            finalize_vouch(bot, db_pool, sessions, user).await?;
        }
        (VouchAction::ConfirmUser, _)
        | (VouchAction::SkipDescription, _)
        | (VouchAction::EditDescription, _)
        | (VouchAction::Submit, _) => {
            bot.answer_callback_query(query.id.clone())
                .text("That action is not available right now.")
                .await?;
        }
    }
    Ok(())
}
