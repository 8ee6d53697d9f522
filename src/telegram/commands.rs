//! Command handlers: the start menu, help, the caller's report listing,
//! creator republish and removal, and the admin commands for
//! retargeting, thresholds and batch updates.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, ParseMode, User};
use teloxide::utils::html;

use crate::admin::update::{UpdateJob, UpdateQueue};
use crate::core::{config, identity};
use crate::core::error::AppResult;
use crate::records::Thresholds;
use crate::session::SessionStore;
use crate::storage::db::{self, DbPool};
use crate::telegram::access;
use crate::telegram::bot::Command;
use crate::telegram::caption;
use crate::telegram::notice::send_ephemeral;
use crate::telegram::veto::{self, VetoStep};
use crate::telegram::vouch::{self, VouchStep};

const HELP_TEXT: &str = "This bot tracks community vouches and reports.\n\n\
/vouch starts a vouch for an account. Everyone can see who vouched.\n\
/veto starts an anonymous report; feedback is required and you can attach screenshots.\n\
/list shows the reports you submitted (DM only).\n\n\
Vote on published records with the buttons under each message. Pressing \
your own vote again retracts it; pressing the other button switches your vote.";

/// Feedback longer than this is truncated in /list output.
const LIST_FEEDBACK_PREVIEW: usize = 200;

/// Dispatches a parsed bot command.
#[allow(clippy::too_many_arguments)]
pub async fn handle_command(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    vouch_sessions: &SessionStore<VouchStep>,
    veto_sessions: &SessionStore<VetoStep>,
    update_queue: &Arc<UpdateQueue>,
    msg: &Message,
    cmd: Command,
) -> AppResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    match cmd {
        Command::Start => handle_start(bot, msg).await,
        Command::Help => handle_help(bot, msg).await,
        Command::Vouch => {
            // Vouching is open to group members, from the group or a DM;
            // the wizard itself always runs in the DM.
            if !access::is_group_member(bot, user.id).await {
                send_ephemeral(
                    bot,
                    msg.chat.id,
                    "Only group members can vouch.",
                    config::notice::usage_delete(),
                )
                .await;
                return Ok(());
            }
            let wizard_chat = if access::is_private_chat(msg) {
                msg.chat.id
            } else {
                send_ephemeral(
                    bot,
                    msg.chat.id,
                    "Check your DMs to continue.",
                    config::notice::usage_delete(),
                )
                .await;
                ChatId(user.id.0 as i64)
            };
            vouch::start_vouch_wizard(bot, vouch_sessions, user, wizard_chat).await
        }
        Command::Veto => {
            if !access::is_private_chat(msg) {
                send_ephemeral(
                    bot,
                    msg.chat.id,
                    "Reports are anonymous. DM me and use /veto there.",
                    config::notice::usage_delete(),
                )
                .await;
                return Ok(());
            }
            if !access::is_group_member(bot, user.id).await {
                send_ephemeral(
                    bot,
                    msg.chat.id,
                    "Only group members can report accounts.",
                    config::notice::usage_delete(),
                )
                .await;
                return Ok(());
            }
            veto::start_veto_wizard(bot, veto_sessions, user, msg.chat.id).await
        }
        Command::List => handle_list(bot, db_pool, msg, user).await,
        Command::Up => handle_republish(bot, db_pool, msg, user).await,
        Command::Editx => handle_retarget_vouch(bot, db_pool, msg, user).await,
        Command::Set => handle_set_thresholds(bot, db_pool, msg, user).await,
        Command::Viewsettings => handle_view_settings(bot, db_pool, msg, user).await,
        Command::Update => handle_update(bot, update_queue, msg, user).await,
        Command::Updatestatus => handle_update_status(bot, update_queue, msg, user).await,
    }
}

async fn handle_start(bot: &Bot, msg: &Message) -> AppResult<()> {
    bot.send_message(msg.chat.id, "What would you like to do?")
        .reply_markup(caption::start_menu_keyboard())
        .await?;
    Ok(())
}

async fn handle_help(bot: &Bot, msg: &Message) -> AppResult<()> {
    bot.send_message(msg.chat.id, HELP_TEXT).await?;
    Ok(())
}

/// Handles start menu button presses.
pub async fn handle_start_callback(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    veto_sessions: &SessionStore<VetoStep>,
    query: &CallbackQuery,
    action: &str,
) -> AppResult<()> {
    bot.answer_callback_query(query.id.clone()).await?;
    let Some(chat_id) = query.message.as_ref().map(|m| m.chat().id) else {
        return Ok(());
    };

    match action {
        "start:veto" => {
            if !access::is_group_member(bot, query.from.id).await {
                send_ephemeral(
                    bot,
                    chat_id,
                    "Only group members can report accounts.",
                    config::notice::usage_delete(),
                )
                .await;
                return Ok(());
            }
            veto::start_veto_wizard(bot, veto_sessions, &query.from, chat_id).await
        }
        "start:list" => send_own_reports(bot, db_pool, chat_id, query.from.id).await,
        "start:help" => {
            bot.send_message(chat_id, HELP_TEXT).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

async fn handle_list(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    if !access::is_private_chat(msg) {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Use /list in a DM.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }
    if !access::is_group_member(bot, user.id).await {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Only group members can use /list.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }
    send_own_reports(bot, db_pool, msg.chat.id, user.id).await
}

/// Sends the caller their own veto submissions, found by the same
/// one-way hash finalize stores. Nobody else's reports are shown.
async fn send_own_reports(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    chat_id: ChatId,
    user_id: UserId,
) -> AppResult<()> {
    let submitter_hash = identity::hash_user_id(user_id.0);
    let conn = db::get_connection(db_pool)?;
    let records = db::list_vetoes_by_submitter(&conn, &submitter_hash)?;

    if records.is_empty() {
        bot.send_message(
            chat_id,
            "You haven't submitted any reports yet.\n\nUse /veto to report an account.",
        )
        .await?;
        return Ok(());
    }

    let mut text = format!("<b>Your anonymous reports ({})</b>\n\n", records.len());
    for record in &records {
        let date = record.created_at.split('T').next().unwrap_or("");
        let feedback = record.feedback.join("\n• ");
        let preview: String = if feedback.chars().count() > LIST_FEEDBACK_PREVIEW {
            let truncated: String = feedback.chars().take(LIST_FEEDBACK_PREVIEW).collect();
            format!("{truncated}...")
        } else {
            feedback
        };
        text.push_str(&format!(
            "- For @{} {}\n📅 {}\n💬 <i>• {}</i>\n\n",
            html::escape(&record.subject),
            record.status.glyph(),
            date,
            html::escape(&preview)
        ));
    }
    text.push_str("<i>All reports are submitted anonymously.</i>");

    bot.send_message(chat_id, text).parse_mode(ParseMode::Html).await?;
    Ok(())
}

/// Republishes the vouch message a command replies to, with a freshly
/// resolved profile image. Only the vouch's creator (or an admin) can
/// do it; the old message is superseded and deleted.
async fn handle_republish(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    let Some(replied) = msg.reply_to_message() else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Reply to the vouch message you want to republish with /up.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    let chat_id = replied.chat.id.0;
    let message_id = i64::from(replied.id.0);
    let conn = db::get_connection(db_pool)?;

    let Some(record) = db::find_vouch_by_message(&conn, chat_id, message_id)? else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "That message is not a tracked vouch.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    let caller = vouch::public_handle(user);
    if caller.as_deref() != Some(record.created_by.as_str()) && !access::is_admin(user.id) {
        send_ephemeral(
            bot,
            msg.chat.id,
            "You can only republish vouches that you created.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let _ = bot.delete_message(replied.chat.id, replied.id).await;
    let published = vouch::publish_vouch(bot, &record).await?;
    db::update_vouch_message(&conn, record.id, published.chat.id.0, published.id.0 as i64)?;

    let _ = bot.delete_message(msg.chat.id, msg.id).await;
    Ok(())
}

/// /editx (reply) retargets a vouch to a new subject, keeping its
/// votes, and reposts it. Refuses when the new subject already has a
/// vouch of its own.
async fn handle_retarget_vouch(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    if !access::is_admin(user.id) {
        return Ok(());
    }
    let Some(replied) = msg.reply_to_message() else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Reply to the vouch message you want to retarget with /editx <handle>.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };
    let text = msg.text().unwrap_or_default();
    let Some(raw_subject) = text.split_whitespace().nth(1) else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Usage: /editx <handle> (as a reply to the vouch message)",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };
    let Some(subject) = crate::records::parse_subject(raw_subject) else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "That does not look like a handle.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    let conn = db::get_connection(db_pool)?;
    let Some(mut record) =
        db::find_vouch_by_message(&conn, replied.chat.id.0, i64::from(replied.id.0))?
    else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "That message is not a tracked vouch.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    if let Some(existing) = db::find_vouch_by_subject(&conn, &subject)? {
        if existing.id != record.id {
            send_ephemeral(
                bot,
                msg.chat.id,
                &format!("A vouch for @{subject} already exists."),
                config::notice::usage_delete(),
            )
            .await;
            return Ok(());
        }
    }

    record.subject = subject.clone();
    db::update_vouch_subject(&conn, record.id, &subject)?;

    let _ = bot.delete_message(replied.chat.id, replied.id).await;
    let published = vouch::publish_vouch(bot, &record).await?;
    db::update_vouch_message(&conn, record.id, published.chat.id.0, published.id.0 as i64)?;

    let _ = bot.delete_message(msg.chat.id, msg.id).await;
    Ok(())
}

/// /set required_upvotes required_downvotes
async fn handle_set_thresholds(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    if !access::is_admin(user.id) {
        return Ok(());
    }
    let text = msg.text().unwrap_or_default();
    let mut parts = text.split_whitespace();
    parts.next();
    let parsed = (
        parts.next().and_then(|v| v.parse::<i64>().ok()),
        parts.next().and_then(|v| v.parse::<i64>().ok()),
    );
    let (Some(up), Some(down)) = parsed else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Usage: /set <required upvotes> <required downvotes>",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };
    if up < 1 || down < 1 {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Thresholds must be at least 1.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let conn = db::get_connection(db_pool)?;
    db::create_settings(
        &conn,
        &Thresholds {
            required_upvotes: up,
            required_downvotes: down,
        },
    )?;
    bot.send_message(
        msg.chat.id,
        format!("Thresholds set: {up} upvotes to approve, {down} downvotes to reject."),
    )
    .await?;
    Ok(())
}

async fn handle_view_settings(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    if !access::is_admin(user.id) {
        return Ok(());
    }
    let conn = db::get_connection(db_pool)?;
    let thresholds = db::current_thresholds(&conn)?;
    bot.send_message(
        msg.chat.id,
        format!(
            "Current thresholds: {} upvotes to approve, {} downvotes to reject.",
            thresholds.required_upvotes, thresholds.required_downvotes
        ),
    )
    .await?;
    Ok(())
}

/// /update <up> <down> <days>: persists the thresholds and queues a
/// recompute of every record created in the last N days.
async fn handle_update(
    bot: &Bot,
    update_queue: &Arc<UpdateQueue>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    if !access::is_admin(user.id) {
        return Ok(());
    }
    let args: Vec<i64> = msg
        .text()
        .unwrap_or_default()
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse::<i64>().ok())
        .collect();
    let [up, down, days] = args[..] else {
        send_ephemeral(
            bot,
            msg.chat.id,
            "Usage: /update <required upvotes> <required downvotes> <days to look back>",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };
    if up < 1 || down < 1 || days < 1 {
        send_ephemeral(
            bot,
            msg.chat.id,
            "All three values must be at least 1.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let position = update_queue
        .enqueue(UpdateJob {
            chat_id: msg.chat.id,
            new_thresholds: Some(Thresholds {
                required_upvotes: up,
                required_downvotes: down,
            }),
            days,
        })
        .await;
    bot.send_message(
        msg.chat.id,
        format!("Status update queued (position {position})."),
    )
    .await?;
    Ok(())
}

/// /updatestatus reports the batch queue state.
async fn handle_update_status(
    bot: &Bot,
    update_queue: &Arc<UpdateQueue>,
    msg: &Message,
    user: &User,
) -> AppResult<()> {
    if !access::is_admin(user.id) {
        return Ok(());
    }
    let pending = update_queue.len().await;
    let state = if update_queue.is_processing() {
        "processing a job"
    } else {
        "idle"
    };
    send_ephemeral(
        bot,
        msg.chat.id,
        &format!("Update queue: {pending} pending, worker {state}."),
        config::notice::batch_cleanup(),
    )
    .await;
    Ok(())
}

/// Reply "x" to a vouch message removes the record and the message.
/// Only the vouch's creator can do it; anything else is ignored.
pub async fn handle_remove_reply(bot: &Bot, db_pool: &Arc<DbPool>, msg: &Message) -> AppResult<bool> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(false);
    };
    if msg.text().map(str::trim) != Some("x") {
        return Ok(false);
    }
    let Some(replied) = msg.reply_to_message() else {
        return Ok(false);
    };

    let chat_id = replied.chat.id.0;
    let message_id = i64::from(replied.id.0);
    let conn = db::get_connection(db_pool)?;

    let Some(record) = db::find_vouch_by_message(&conn, chat_id, message_id)? else {
        return Ok(false);
    };
    let caller = vouch::public_handle(user);
    if caller.as_deref() != Some(record.created_by.as_str()) {
        return Ok(false);
    }

    db::delete_vouch(&conn, record.id)?;
    log::info!("Removed vouch for {}", record.subject);
    let _ = bot.delete_message(replied.chat.id, replied.id).await;
    let _ = bot.delete_message(msg.chat.id, msg.id).await;
    Ok(true)
}
