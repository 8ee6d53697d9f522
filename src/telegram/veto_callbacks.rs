//! Callback routing for the veto wizard buttons, including the modify
//! menu shown from the review screen.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::CallbackQuery;

use crate::core::config;
use crate::core::error::AppResult;
use crate::session::SessionStore;
use crate::storage::db::DbPool;
use crate::telegram::caption;
use crate::telegram::veto::{
    self, cancel_wizard, finalize_veto, show_review_screen, VetoStep,
};

/// Button actions of the veto wizard, parsed from callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VetoAction {
    Cancel,
    EditUser,
    ConfirmUser,
    DoneImages,
    Modify,
    ModifyUser,
    ModifyFeedback,
    ModifyImages,
    BackReview,
    Submit,
}

impl VetoAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "veto:cancel" => Some(Self::Cancel),
            "veto:edit_user" => Some(Self::EditUser),
            "veto:confirm_user" => Some(Self::ConfirmUser),
            "veto:done_images" => Some(Self::DoneImages),
            "veto:modify" => Some(Self::Modify),
            "veto:modify_user" => Some(Self::ModifyUser),
            "veto:modify_feedback" => Some(Self::ModifyFeedback),
            "veto:modify_images" => Some(Self::ModifyImages),
            "veto:back_review" => Some(Self::BackReview),
            "veto:submit" => Some(Self::Submit),
            _ => None,
        }
    }
}

/// Handles a veto wizard button press with an explicit (action, step)
/// match; stale buttons answer with a toast.
pub async fn handle_veto_callback(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VetoStep>,
    query: &CallbackQuery,
    action: VetoAction,
) -> AppResult<()> {
    let user = &query.from;
    let Some(session) = sessions.get(user.id).await else {
        bot.answer_callback_query(query.id.clone())
            .text("This wizard has expired. Start again with /veto.")
            .await?;
        return Ok(());
    };

    match (action, session.step.clone()) {
        (VetoAction::Cancel, _) => {
            bot.answer_callback_query(query.id.clone()).await?;
            cancel_wizard(bot, sessions, user.id).await;
        }
        (VetoAction::EditUser, _) | (VetoAction::ModifyUser, _) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| s.step = VetoStep::Username)
                .await
                .unwrap_or(session);
            veto::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                "Who are you reporting? Send an X handle or profile link.",
                caption::wizard_cancel_keyboard("veto"),
            )
            .await?;
        }
        (VetoAction::ConfirmUser, VetoStep::AwaitConfirm { target }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| s.step = VetoStep::Feedback { target: target.clone() })
                .await
                .unwrap_or(session);
            veto::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                &format!(
                    "Describe what @{} did (up to {} characters). Feedback is required.",
                    target.subject,
                    config::session::MAX_FEEDBACK_LEN
                ),
                caption::veto_feedback_keyboard(),
            )
            .await?;
        }
        (VetoAction::DoneImages, VetoStep::Images { target, feedback, images }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| {
                    s.step = VetoStep::Review {
                        target: target.clone(),
                        feedback: feedback.clone(),
                        images: images.clone(),
                    }
                })
                .await
                .unwrap_or(session);
            show_review_screen(bot, db_pool, sessions, user, &session, &target, &feedback, &images)
                .await?;
        }
        (VetoAction::Modify, VetoStep::Review { .. }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            veto::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                "What do you want to change?",
                caption::veto_modify_keyboard(),
            )
            .await?;
        }
        (VetoAction::ModifyFeedback, VetoStep::Review { target, .. }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| s.step = VetoStep::Feedback { target: target.clone() })
                .await
                .unwrap_or(session);
            veto::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                &format!(
                    "Send the new feedback for @{} (up to {} characters).",
                    target.subject,
                    config::session::MAX_FEEDBACK_LEN
                ),
                caption::veto_feedback_keyboard(),
            )
            .await?;
        }
        (VetoAction::ModifyImages, VetoStep::Review { target, feedback, .. }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            let session = sessions
                .update(user.id, |s| {
                    s.step = VetoStep::Images {
                        target: target.clone(),
                        feedback: feedback.clone(),
                        images: Vec::new(),
                    }
                })
                .await
                .unwrap_or(session);
            veto::render_screen(
                bot,
                sessions,
                user.id,
                &session,
                &format!(
                    "Attach up to {} screenshots as evidence, or skip. Previous attachments were discarded.",
                    config::session::MAX_VETO_IMAGES
                ),
                caption::veto_images_keyboard(0),
            )
            .await?;
        }
        (VetoAction::BackReview, VetoStep::Review { target, feedback, images }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            show_review_screen(bot, db_pool, sessions, user, &session, &target, &feedback, &images)
                .await?;
        }
        (VetoAction::Submit, VetoStep::Review { .. }) => {
            bot.answer_callback_query(query.id.clone()).await?;
            finalize_veto(bot, db_pool, sessions, user).await?;
        }
        (VetoAction::ConfirmUser, _)
        | (VetoAction::DoneImages, _)
        | (VetoAction::Modify, _)
        | (VetoAction::ModifyFeedback, _)
        | (VetoAction::ModifyImages, _)
        | (VetoAction::BackReview, _)
        | (VetoAction::Submit, _) => {
            bot.answer_callback_query(query.id.clone())
                .text("That action is not available right now.")
                .await?;
        }
    }
    Ok(())
}
