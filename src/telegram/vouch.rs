//! Vouch wizard: username confirmation, optional description, review,
//! then publication of the vote message to the group.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ThreadId, User};
use teloxide::utils::html;

use crate::core::config;
use crate::core::error::AppResult;
use crate::records::{self, derive_status, merge_description, push_unique};
use crate::session::{Session, SessionStore};
use crate::storage::db::{self, DbPool, VouchRecord};
use crate::telegram::caption;
use crate::telegram::notice::{delete_messages, send_ephemeral};
use crate::{profile, storage};

/// State machine for the vouch wizard. Each step carries everything it
/// needs, so an out-of-order update cannot observe half-filled state.
#[derive(Debug, Clone, Default)]
pub enum VouchStep {
    /// Waiting for a handle; `candidate` is set once a confirmation
    /// screen is showing.
    #[default]
    Username,
    AwaitConfirm {
        target: VouchTarget,
    },
    Description {
        target: VouchTarget,
    },
    Review {
        target: VouchTarget,
        description: Option<String>,
    },
}

/// The subject being vouched for. When a vouch for the subject already
/// exists, `existing_id` marks the wizard as a merge and is resolved
/// exactly once, when the handle is accepted.
#[derive(Debug, Clone)]
pub struct VouchTarget {
    pub subject: String,
    pub existing_id: Option<i64>,
}

/// The submitting user's public handle, lowercased. Vouches are public,
/// so a handle is mandatory.
pub fn public_handle(user: &User) -> Option<String> {
    user.username.as_ref().map(|u| u.to_lowercase())
}

/// Starts the vouch wizard for the user, in their private chat.
pub async fn start_vouch_wizard(
    bot: &Bot,
    sessions: &SessionStore<VouchStep>,
    user: &User,
    chat_id: ChatId,
) -> AppResult<()> {
    if public_handle(user).is_none() {
        send_ephemeral(
            bot,
            chat_id,
            "You need a public Telegram username to vouch.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    if sessions.start(user.id, chat_id, VouchStep::Username).await.is_err() {
        send_ephemeral(
            bot,
            chat_id,
            "You already have a vouch in progress. Finish or cancel it first.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let msg = bot
        .send_message(
            chat_id,
            "Who are you vouching for? Send an X handle or profile link.\n\nType \"cancel\" at any time to abort.",
        )
        .await?;
    sessions.set_main_message(user.id, msg.id).await;
    Ok(())
}

/// Routes a text or photo message into the active vouch session.
/// Returns false when the message was not consumed.
pub async fn handle_wizard_message(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VouchStep>,
    msg: &Message,
) -> AppResult<bool> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(false);
    };
    let Some(session) = sessions.get(user.id).await else {
        return Ok(false);
    };
    if session.chat_id != msg.chat.id {
        return Ok(false);
    }

    sessions.track_message(user.id, msg.id).await;
    let text = msg.text().map(str::trim).unwrap_or_default();

    if text.eq_ignore_ascii_case("cancel") {
        cancel_wizard(bot, sessions, user.id).await;
        return Ok(true);
    }

    match session.step {
        VouchStep::Username | VouchStep::AwaitConfirm { .. } => {
            handle_username_input(bot, db_pool, sessions, user, &session, text).await?;
        }
        VouchStep::Description { ref target } => {
            handle_description_input(bot, db_pool, sessions, user, &session, target.clone(), text)
                .await?;
        }
        VouchStep::Review { .. } => {
            send_ephemeral(
                bot,
                msg.chat.id,
                "Use the buttons to submit, edit or cancel.",
                config::notice::usage_delete(),
            )
            .await;
        }
    }
    Ok(true)
}

async fn handle_username_input(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VouchStep>,
    user: &User,
    session: &Session<VouchStep>,
    text: &str,
) -> AppResult<()> {
    let Some(subject) = records::parse_subject(text) else {
        send_ephemeral(
            bot,
            session.chat_id,
            "That does not look like a handle. Send something like @name or x.com/name.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    if subject == config::BOT_HANDLE.to_lowercase() {
        send_ephemeral(
            bot,
            session.chat_id,
            "Nice try, but you cannot vouch for the bot.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    // Merge mode is decided here, once, and carried through the wizard.
    let conn = storage::db::get_connection(db_pool)?;
    let existing = db::find_vouch_by_subject(&conn, &subject)?;

    let target = VouchTarget {
        subject: subject.clone(),
        existing_id: existing.as_ref().map(|r| r.id),
    };
    sessions
        .update(user.id, |s| s.step = VouchStep::AwaitConfirm { target: target.clone() })
        .await;

    let mut screen = format!("Vouching for @{}.", html::escape(&subject));
    if let Some(record) = existing {
        screen.push_str(&format!(
            "\n\nA vouch for this account already exists: ✅ {} / ❌ {}, status {}. Your vouch will add your support to it.",
            record.upvoters.len(),
            record.downvoters.len(),
            record.status.as_str(),
        ));
    }
    render_screen(bot, sessions, user.id, session, &screen, caption::vouch_username_keyboard()).await
}

async fn handle_description_input(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VouchStep>,
    user: &User,
    session: &Session<VouchStep>,
    target: VouchTarget,
    text: &str,
) -> AppResult<()> {
    if text.is_empty() {
        send_ephemeral(
            bot,
            session.chat_id,
            "Send a short description, or press Skip.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }
    if text.chars().count() > config::session::MAX_DESCRIPTION_LEN {
        send_ephemeral(
            bot,
            session.chat_id,
            &format!(
                "Description is too long ({} characters max).",
                config::session::MAX_DESCRIPTION_LEN
            ),
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let description = Some(text.to_string());
    sessions
        .update(user.id, |s| {
            s.step = VouchStep::Review {
                target: target.clone(),
                description: description.clone(),
            }
        })
        .await;
    show_review_screen(bot, db_pool, sessions, user, session, &target, description.as_deref()).await
}

/// Builds the record exactly as finalize would persist it, without
/// touching durable state. In merge mode the existing record is the
/// base; otherwise the caller becomes sole voucher and upvoter.
pub fn build_vouch_preview(
    existing: Option<VouchRecord>,
    subject: &str,
    voucher: &str,
    description: Option<&str>,
    thresholds: &records::Thresholds,
) -> VouchRecord {
    match existing {
        Some(mut record) => {
            push_unique(&mut record.vouchers, voucher);
            let already_voted = record.upvoters.iter().any(|v| v == voucher)
                || record.downvoters.iter().any(|v| v == voucher);
            if !already_voted {
                record.upvoters.push(voucher.to_string());
            }
            record.description = merge_description(record.description.as_deref(), description);
            record.status =
                derive_status(record.upvoters.len(), record.downvoters.len(), thresholds);
            record
        }
        None => VouchRecord {
            id: 0,
            subject: subject.to_string(),
            message_id: None,
            chat_id: None,
            created_by: voucher.to_string(),
            vouchers: vec![voucher.to_string()],
            upvoters: vec![voucher.to_string()],
            downvoters: Vec::new(),
            status: derive_status(1, 0, thresholds),
            description: description.map(str::to_string),
            created_at: String::new(),
            updated_at: String::new(),
        },
    }
}

/// Renders the review screen: a full preview of the post as it would be
/// published, with the caller's vote already counted.
pub async fn show_review_screen(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VouchStep>,
    user: &User,
    session: &Session<VouchStep>,
    target: &VouchTarget,
    description: Option<&str>,
) -> AppResult<()> {
    let Some(voucher) = public_handle(user) else {
        return Ok(());
    };
    let conn = storage::db::get_connection(db_pool)?;
    let thresholds = db::current_thresholds(&conn)?;
    let existing = target.existing_id.and_then(|id| {
        db::find_vouch_by_subject(&conn, &target.subject).ok().flatten().filter(|r| r.id == id)
    });
    let merging = existing.is_some();
    let preview = build_vouch_preview(existing, &target.subject, &voucher, description, &thresholds);

    let screen = caption::vouch_review_caption(&preview, merging);
    render_screen(bot, sessions, user.id, session, &screen, caption::vouch_review_keyboard()).await
}

/// Edits the main wizard message in place, or sends a fresh one when
/// editing fails or no main message exists yet.
pub async fn render_screen(
    bot: &Bot,
    sessions: &SessionStore<VouchStep>,
    user_id: UserId,
    session: &Session<VouchStep>,
    text: &str,
    keyboard: teloxide::types::InlineKeyboardMarkup,
) -> AppResult<()> {
    use teloxide::types::ParseMode;

    if let Some(main_id) = session.main_message_id {
        let edited = bot
            .edit_message_text(session.chat_id, main_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .await;
        if edited.is_ok() {
            return Ok(());
        }
    }
    let msg = bot
        .send_message(session.chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;
    sessions.set_main_message(user_id, msg.id).await;
    Ok(())
}

/// Cancels the wizard, deleting everything it produced.
pub async fn cancel_wizard(bot: &Bot, sessions: &SessionStore<VouchStep>, user_id: UserId) {
    if let Some(session) = sessions.clear(user_id).await {
        delete_messages(bot, session.chat_id, &session.message_ids).await;
        send_ephemeral(
            bot,
            session.chat_id,
            "Vouch cancelled.",
            config::notice::cancel_delete(),
        )
        .await;
    }
}

/// Finalizes the vouch. The session is cleared before any record or
/// message effect, so a failure partway through can never leave a
/// zombie wizard behind.
pub async fn finalize_vouch(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VouchStep>,
    user: &User,
) -> AppResult<()> {
    let Some(session) = sessions.clear(user.id).await else {
        return Ok(());
    };
    delete_messages(bot, session.chat_id, &session.message_ids).await;

    let VouchStep::Review { target, description } = session.step else {
        send_ephemeral(
            bot,
            session.chat_id,
            "This vouch was not ready to submit.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };
    let Some(voucher) = public_handle(user) else {
        return Ok(());
    };

    let conn = storage::db::get_connection(db_pool)?;
    let thresholds = db::current_thresholds(&conn)?;

    let record = match target.existing_id.and_then(|id| {
        // Merge target may have been removed while the wizard ran.
        db::find_vouch_by_subject(&conn, &target.subject).ok().flatten().filter(|r| r.id == id)
    }) {
        Some(existing) => {
            let merged = build_vouch_preview(
                Some(existing),
                &target.subject,
                &voucher,
                description.as_deref(),
                &thresholds,
            );
            db::update_vouch_content(
                &conn,
                merged.id,
                &merged.vouchers,
                &merged.upvoters,
                merged.description.as_deref(),
                merged.status,
            )?;
            // The old vote message is superseded by the republished one.
            if let (Some(chat_id), Some(message_id)) = (merged.chat_id, merged.message_id) {
                let _ = bot
                    .delete_message(ChatId(chat_id), MessageId(message_id as i32))
                    .await;
            }
            merged
        }
        None => {
            let status = derive_status(1, 0, &thresholds);
            db::create_vouch(
                &conn,
                &target.subject,
                None,
                None,
                &voucher,
                &[voucher.clone()],
                &[voucher.clone()],
                description.as_deref(),
                status,
            )?
        }
    };

    match publish_vouch(bot, &record).await {
        Ok(published) => {
            db::update_vouch_message(&conn, record.id, published.chat.id.0, published.id.0 as i64)?;
            send_ephemeral(
                bot,
                session.chat_id,
                &format!("Vouch for @{} submitted ✅", record.subject),
                config::notice::success_delete(),
            )
            .await;
        }
        Err(err) => {
            log::error!("Failed to publish vouch for {}: {}", record.subject, err);
            send_ephemeral(
                bot,
                session.chat_id,
                "Vouch recorded, but publishing to the group failed.",
                config::notice::usage_delete(),
            )
            .await;
        }
    }
    Ok(())
}

/// Sends the vote message for a vouch to the configured group.
pub async fn publish_vouch(bot: &Bot, record: &VouchRecord) -> AppResult<Message> {
    use teloxide::types::ParseMode;

    let group = ChatId(*config::ALLOWED_GROUP_ID);
    let image_url = profile::resolve_profile_image(&record.subject).await;
    let photo = match url::Url::parse(&image_url) {
        Ok(url) => InputFile::url(url),
        Err(_) => InputFile::url(
            url::Url::parse(profile::FALLBACK_IMAGE_URL).expect("fallback URL is valid"),
        ),
    };

    let mut request = bot
        .send_photo(group, photo)
        .caption(caption::vouch_caption(record))
        .parse_mode(ParseMode::Html)
        .reply_markup(caption::vouch_vote_keyboard(record));
    if let Some(thread) = *config::VOUCH_THREAD_ID {
        request = request.message_thread_id(ThreadId(MessageId(thread)));
    }
    Ok(request.await?)
}

/// Applies a vote result to the published vouch message.
pub async fn rerender_vouch_message(bot: &Bot, record: &VouchRecord) -> AppResult<()> {
    use teloxide::types::ParseMode;

    let (Some(chat_id), Some(message_id)) = (record.chat_id, record.message_id) else {
        return Ok(());
    };
    let chat = ChatId(chat_id);
    let msg_id = MessageId(message_id as i32);
    let text = caption::vouch_caption(record);
    let keyboard = caption::vouch_vote_keyboard(record);

    let edited = bot
        .edit_message_caption(chat, msg_id)
        .caption(text.clone())
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard.clone())
        .await;
    if edited.is_err() {
        bot.edit_message_text(chat, msg_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RecordStatus, Thresholds};
    use pretty_assertions::assert_eq;

    fn thresholds() -> Thresholds {
        Thresholds {
            required_upvotes: 15,
            required_downvotes: 3,
        }
    }

    #[test]
    fn fresh_preview_counts_the_caller_as_sole_upvoter() {
        let preview =
            build_vouch_preview(None, "alice", "bob", Some("great trader"), &thresholds());
        assert_eq!(preview.subject, "alice");
        assert_eq!(preview.vouchers, vec!["bob"]);
        assert_eq!(preview.upvoters, vec!["bob"]);
        assert!(preview.downvoters.is_empty());
        assert_eq!(preview.status, RecordStatus::Pending);
        assert_eq!(preview.description.as_deref(), Some("great trader"));
    }

    #[test]
    fn merge_preview_adds_caller_and_merges_description() {
        let existing = VouchRecord {
            id: 7,
            subject: "alice".to_string(),
            message_id: Some(10),
            chat_id: Some(-100),
            created_by: "carol".to_string(),
            vouchers: vec!["carol".to_string()],
            upvoters: vec!["carol".to_string()],
            downvoters: vec!["dave".to_string()],
            status: RecordStatus::Pending,
            description: Some("solid".to_string()),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let preview = build_vouch_preview(
            Some(existing),
            "alice",
            "bob",
            Some("vouched twice"),
            &thresholds(),
        );
        assert_eq!(preview.vouchers, vec!["carol", "bob"]);
        assert_eq!(preview.upvoters, vec!["carol", "bob"]);
        assert_eq!(preview.downvoters, vec!["dave"]);
        assert_eq!(preview.description.as_deref(), Some("solid\n\nvouched twice"));
    }

    #[test]
    fn merge_preview_keeps_an_existing_downvote() {
        let existing = VouchRecord {
            id: 7,
            subject: "alice".to_string(),
            message_id: None,
            chat_id: None,
            created_by: "carol".to_string(),
            vouchers: vec!["carol".to_string()],
            upvoters: vec![],
            downvoters: vec!["bob".to_string()],
            status: RecordStatus::Pending,
            description: None,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let preview = build_vouch_preview(Some(existing), "alice", "bob", None, &thresholds());
        assert_eq!(preview.vouchers, vec!["carol", "bob"]);
        assert!(preview.upvoters.is_empty());
        assert_eq!(preview.downvoters, vec!["bob"]);
    }
}
