//! Vote button handling for published vouch and veto messages.
//! The database write always lands before the caption re-render, so a
//! failed edit never loses a vote.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MaybeInaccessibleMessage};

use crate::core::error::AppResult;
use crate::records::{apply_vote, derive_status, VoteDirection, VoteOutcome};
use crate::storage::db::{self, DbPool};
use crate::telegram::{veto, vouch};
use crate::storage;

/// Which record family a vote button belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Vouch,
    Veto,
}

/// Parses vote callback data into its kind and direction.
pub fn parse_vote(data: &str) -> Option<(VoteKind, VoteDirection)> {
    match data {
        "vote:up" => Some((VoteKind::Vouch, VoteDirection::Up)),
        "vote:down" => Some((VoteKind::Vouch, VoteDirection::Down)),
        "rvote:up" => Some((VoteKind::Veto, VoteDirection::Up)),
        "rvote:down" => Some((VoteKind::Veto, VoteDirection::Down)),
        _ => None,
    }
}

fn toast(kind: VoteKind, direction: VoteDirection, outcome: VoteOutcome) -> &'static str {
    match (kind, direction, outcome) {
        (VoteKind::Vouch, VoteDirection::Up, VoteOutcome::Removed) => "Upvote removed!",
        (VoteKind::Vouch, VoteDirection::Down, VoteOutcome::Removed) => "Downvote removed!",
        (VoteKind::Veto, VoteDirection::Up, VoteOutcome::Removed) => "Support removed!",
        (VoteKind::Veto, VoteDirection::Down, VoteOutcome::Removed) => "Disagreement removed!",
        (_, _, VoteOutcome::Switched) => "Vote changed!",
        (_, _, VoteOutcome::Added) => "Vote recorded!",
    }
}

/// Handles a press on a vote button under a published record.
pub async fn handle_vote_callback(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    query: &CallbackQuery,
    kind: VoteKind,
    direction: VoteDirection,
) -> AppResult<()> {
    let Some(voter) = vouch::public_handle(&query.from) else {
        bot.answer_callback_query(query.id.clone())
            .text("Set a public Telegram username to vote.")
            .await?;
        return Ok(());
    };

    let Some(MaybeInaccessibleMessage::Regular(message)) = query.message.as_ref() else {
        bot.answer_callback_query(query.id.clone())
            .text("This vote message is no longer available.")
            .await?;
        return Ok(());
    };
    let chat_id = message.chat.id.0;
    let message_id = i64::from(message.id.0);

    let conn = storage::db::get_connection(db_pool)?;
    let thresholds = db::current_thresholds(&conn)?;

    let (outcome, rendered) = match kind {
        VoteKind::Vouch => {
            let Some(mut record) = db::find_vouch_by_message(&conn, chat_id, message_id)? else {
                bot.answer_callback_query(query.id.clone())
                    .text("This vote is no longer tracked.")
                    .await?;
                return Ok(());
            };
            let outcome = apply_vote(&mut record.upvoters, &mut record.downvoters, &voter, direction);
            record.status = derive_status(record.upvoters.len(), record.downvoters.len(), &thresholds);
            db::update_vouch_votes(&conn, record.id, &record.upvoters, &record.downvoters, record.status)?;
            (outcome, vouch::rerender_vouch_message(bot, &record).await)
        }
        VoteKind::Veto => {
            let Some(mut record) = db::find_veto_by_message(&conn, chat_id, message_id)? else {
                bot.answer_callback_query(query.id.clone())
                    .text("This vote is no longer tracked.")
                    .await?;
                return Ok(());
            };
            let outcome = apply_vote(&mut record.upvoters, &mut record.downvoters, &voter, direction);
            record.status = derive_status(record.upvoters.len(), record.downvoters.len(), &thresholds);
            db::update_veto_votes(&conn, record.id, &record.upvoters, &record.downvoters, record.status)?;
            (outcome, veto::rerender_veto_message(bot, &record).await)
        }
    };

    // The vote is already persisted; a failed render only logs.
    if let Err(err) = rendered {
        log::warn!("Vote recorded but caption update failed: {}", err);
    }

    bot.answer_callback_query(query.id.clone())
        .text(toast(kind, direction, outcome))
        .await?;
    Ok(())
}
