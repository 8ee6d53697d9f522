//! Veto wizard: username confirmation, mandatory feedback, optional
//! evidence images, review with media preview, then publication.
//! Submitters stay anonymous; only a one-way hash of their user id is
//! stored, and a repeat report for the same subject is refused.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{
    FileId, InputFile, InputMedia, InputMediaPhoto, MessageId, ThreadId, User,
};
use teloxide::utils::html;

use crate::core::error::AppResult;
use crate::core::{config, identity};
use crate::records::{self, derive_status};
use crate::session::{Session, SessionStore};
use crate::storage::db::{self, DbPool, VetoRecord};
use crate::telegram::caption;
use crate::telegram::notice::{delete_messages, send_ephemeral};
use crate::telegram::vouch::public_handle;
use crate::{profile, storage};

/// State machine for the veto wizard.
#[derive(Debug, Clone, Default)]
pub enum VetoStep {
    #[default]
    Username,
    AwaitConfirm {
        target: VetoTarget,
    },
    Feedback {
        target: VetoTarget,
    },
    Images {
        target: VetoTarget,
        feedback: String,
        images: Vec<String>,
    },
    Review {
        target: VetoTarget,
        feedback: String,
        images: Vec<String>,
    },
}

/// The subject being reported. `existing_id` marks a merge into an
/// existing veto, resolved once when the handle is accepted.
#[derive(Debug, Clone)]
pub struct VetoTarget {
    pub subject: String,
    pub existing_id: Option<i64>,
}

/// Starts the veto wizard in the user's private chat.
pub async fn start_veto_wizard(
    bot: &Bot,
    sessions: &SessionStore<VetoStep>,
    user: &User,
    chat_id: ChatId,
) -> AppResult<()> {
    if sessions.start(user.id, chat_id, VetoStep::Username).await.is_err() {
        send_ephemeral(
            bot,
            chat_id,
            "You already have a report in progress. Finish or cancel it first.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let msg = bot
        .send_message(
            chat_id,
            "Who are you reporting? Send an X handle or profile link.\n\nReports are anonymous. Type \"cancel\" at any time to abort.",
        )
        .await?;
    sessions.set_main_message(user.id, msg.id).await;
    Ok(())
}

/// Routes a message into the active veto session.
/// Returns false when the message was not consumed.
pub async fn handle_wizard_message(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VetoStep>,
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

    match session.step.clone() {
        VetoStep::Username | VetoStep::AwaitConfirm { .. } => {
            handle_username_input(bot, db_pool, sessions, user, &session, text).await?;
        }
        VetoStep::Feedback { target } => {
            handle_feedback_input(bot, sessions, user, &session, target, text).await?;
        }
        VetoStep::Images { target, feedback, images } => {
            handle_image_input(bot, sessions, user, &session, target, feedback, images, msg).await?;
        }
        VetoStep::Review { .. } => {
            send_ephemeral(
                bot,
                msg.chat.id,
                "Use the buttons to submit, modify or cancel.",
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
    sessions: &SessionStore<VetoStep>,
    user: &User,
    session: &Session<VetoStep>,
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
            "You cannot report the bot.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let conn = storage::db::get_connection(db_pool)?;
    let existing = db::find_veto_by_subject(&conn, &subject)?;

    // A submitter gets one report per subject, ever.
    if let Some(ref record) = existing {
        let submitter_hash = identity::hash_user_id(user.id.0);
        if db::veto_has_submitter(record, &submitter_hash) {
            cancel_quietly(bot, sessions, user.id).await;
            send_ephemeral(
                bot,
                session.chat_id,
                "You have already reported this account.",
                config::notice::usage_delete(),
            )
            .await;
            return Ok(());
        }
    }

    let target = VetoTarget {
        subject: subject.clone(),
        existing_id: existing.map(|r| r.id),
    };
    let merged = target.existing_id.is_some();
    sessions
        .update(user.id, |s| s.step = VetoStep::AwaitConfirm { target: target.clone() })
        .await;

    let mut screen = format!("Reporting @{}.", html::escape(&subject));
    if merged {
        screen.push_str("\n\nA report for this account already exists; yours will be merged into it.");
    }
    render_screen(bot, sessions, user.id, session, &screen, caption::veto_username_keyboard()).await
}

async fn handle_feedback_input(
    bot: &Bot,
    sessions: &SessionStore<VetoStep>,
    user: &User,
    session: &Session<VetoStep>,
    target: VetoTarget,
    text: &str,
) -> AppResult<()> {
    if text.is_empty() {
        send_ephemeral(
            bot,
            session.chat_id,
            "Feedback is required. Describe what happened.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }
    if text.chars().count() > config::session::MAX_FEEDBACK_LEN {
        send_ephemeral(
            bot,
            session.chat_id,
            &format!(
                "Feedback is too long ({} characters max).",
                config::session::MAX_FEEDBACK_LEN
            ),
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    let feedback = text.to_string();
    sessions
        .update(user.id, |s| {
            s.step = VetoStep::Images {
                target: target.clone(),
                feedback: feedback.clone(),
                images: Vec::new(),
            }
        })
        .await;
    render_screen(
        bot,
        sessions,
        user.id,
        session,
        &format!(
            "Attach up to {} screenshots as evidence, or skip.",
            config::session::MAX_VETO_IMAGES
        ),
        caption::veto_images_keyboard(0),
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn handle_image_input(
    bot: &Bot,
    sessions: &SessionStore<VetoStep>,
    user: &User,
    session: &Session<VetoStep>,
    target: VetoTarget,
    feedback: String,
    mut images: Vec<String>,
    msg: &Message,
) -> AppResult<()> {
    let Some(photos) = msg.photo() else {
        send_ephemeral(
            bot,
            session.chat_id,
            "Send a photo, or press Done.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    if images.len() >= config::session::MAX_VETO_IMAGES {
        send_ephemeral(
            bot,
            session.chat_id,
            &format!("Limit reached ({} images).", config::session::MAX_VETO_IMAGES),
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    }

    // Telegram sends several sizes; the last one is the largest.
    if let Some(photo) = photos.last() {
        images.push(photo.file.id.0.clone());
    }
    let count = images.len();
    sessions
        .update(user.id, |s| {
            s.step = VetoStep::Images {
                target: target.clone(),
                feedback: feedback.clone(),
                images: images.clone(),
            }
        })
        .await;
    render_screen(
        bot,
        sessions,
        user.id,
        session,
        &format!(
            "{count} of {} images attached. Send more or press Done.",
            config::session::MAX_VETO_IMAGES
        ),
        caption::veto_images_keyboard(count),
    )
    .await
}

/// Builds the record exactly as finalize would persist it, without
/// touching durable state. In merge mode the existing record is the
/// base; the submitter's upvote is counted when they have a public
/// handle and no prior vote.
pub fn build_veto_preview(
    existing: Option<VetoRecord>,
    subject: &str,
    feedback: &str,
    images: &[String],
    submitter_handle: Option<&str>,
    thresholds: &records::Thresholds,
) -> VetoRecord {
    match existing {
        Some(mut record) => {
            record.feedback.push(feedback.to_string());
            record.images.extend(images.iter().cloned());
            if let Some(handle) = submitter_handle {
                let already_voted = record.upvoters.iter().any(|v| v == handle)
                    || record.downvoters.iter().any(|v| v == handle);
                if !already_voted {
                    record.upvoters.push(handle.to_string());
                }
            }
            record.status =
                derive_status(record.upvoters.len(), record.downvoters.len(), thresholds);
            record
        }
        None => {
            let upvoters: Vec<String> =
                submitter_handle.map(str::to_string).into_iter().collect();
            let status = derive_status(upvoters.len(), 0, thresholds);
            VetoRecord {
                id: 0,
                subject: subject.to_string(),
                message_id: None,
                chat_id: None,
                feedback: vec![feedback.to_string()],
                submitted_by: Vec::new(),
                upvoters,
                downvoters: Vec::new(),
                images: images.to_vec(),
                status,
                created_at: String::new(),
                updated_at: String::new(),
            }
        }
    }
}

/// Renders the review screen: a full preview of the post as it would be
/// published. Attached images are sent as a media group above the
/// summary; with none attached, the resolved profile image is shown the
/// way the published message will carry it. Everything is tracked for
/// cleanup.
#[allow(clippy::too_many_arguments)]
pub async fn show_review_screen(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VetoStep>,
    user: &User,
    session: &Session<VetoStep>,
    target: &VetoTarget,
    feedback: &str,
    images: &[String],
) -> AppResult<()> {
    use teloxide::types::ParseMode;

    let conn = storage::db::get_connection(db_pool)?;
    let thresholds = db::current_thresholds(&conn)?;
    let existing = target.existing_id.and_then(|id| {
        db::find_veto_by_subject(&conn, &target.subject).ok().flatten().filter(|r| r.id == id)
    });
    let merging = existing.is_some();
    let handle = public_handle(user);
    let preview = build_veto_preview(
        existing,
        &target.subject,
        feedback,
        images,
        handle.as_deref(),
        &thresholds,
    );
    let screen = caption::veto_review_caption(&preview, images.len(), merging);

    if images.is_empty() {
        // The published message carries the profile picture; show it.
        let image_url = profile::resolve_profile_image(&target.subject).await;
        if let Ok(url) = url::Url::parse(&image_url) {
            match bot
                .send_photo(session.chat_id, InputFile::url(url))
                .caption(screen.clone())
                .parse_mode(ParseMode::Html)
                .reply_markup(caption::veto_review_keyboard())
                .await
            {
                Ok(sent) => {
                    sessions.set_main_message(user.id, sent.id).await;
                    return Ok(());
                }
                Err(err) => log::warn!("Failed to send review photo: {}", err),
            }
        }
    } else {
        let media: Vec<InputMedia> = images
            .iter()
            .map(|file_id| {
                InputMedia::Photo(InputMediaPhoto::new(InputFile::file_id(FileId(
                    file_id.clone(),
                ))))
            })
            .collect();
        match bot.send_media_group(session.chat_id, media).await {
            Ok(sent) => {
                for m in &sent {
                    sessions.track_message(user.id, m.id).await;
                }
            }
            Err(err) => log::warn!("Failed to send review media group: {}", err),
        }
    }

    render_screen(bot, sessions, user.id, session, &screen, caption::veto_review_keyboard()).await
}

pub async fn render_screen(
    bot: &Bot,
    sessions: &SessionStore<VetoStep>,
    user_id: UserId,
    session: &Session<VetoStep>,
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

/// Cancels the wizard with a notice.
pub async fn cancel_wizard(bot: &Bot, sessions: &SessionStore<VetoStep>, user_id: UserId) {
    if let Some(session) = sessions.clear(user_id).await {
        delete_messages(bot, session.chat_id, &session.message_ids).await;
        send_ephemeral(
            bot,
            session.chat_id,
            "Report cancelled.",
            config::notice::cancel_delete(),
        )
        .await;
    }
}

/// Clears the wizard without the cancellation notice; callers send
/// their own explanation.
async fn cancel_quietly(bot: &Bot, sessions: &SessionStore<VetoStep>, user_id: UserId) {
    if let Some(session) = sessions.clear(user_id).await {
        delete_messages(bot, session.chat_id, &session.message_ids).await;
    }
}

/// Finalizes the veto. The session is cleared before any record or
/// message effect.
pub async fn finalize_veto(
    bot: &Bot,
    db_pool: &Arc<DbPool>,
    sessions: &SessionStore<VetoStep>,
    user: &User,
) -> AppResult<()> {
    let Some(session) = sessions.clear(user.id).await else {
        return Ok(());
    };
    delete_messages(bot, session.chat_id, &session.message_ids).await;

    let VetoStep::Review { target, feedback, images } = session.step else {
        send_ephemeral(
            bot,
            session.chat_id,
            "This report was not ready to submit.",
            config::notice::usage_delete(),
        )
        .await;
        return Ok(());
    };

    let submitter_hash = identity::hash_user_id(user.id.0);
    let submitter_handle = public_handle(user);

    let conn = storage::db::get_connection(db_pool)?;
    let thresholds = db::current_thresholds(&conn)?;

    let record = match target
        .existing_id
        .and_then(|id| db::find_veto_by_subject(&conn, &target.subject).ok().flatten().filter(|r| r.id == id))
    {
        Some(existing) => {
            // Re-check: another report may have merged while this
            // wizard was still open.
            if db::veto_has_submitter(&existing, &submitter_hash) {
                send_ephemeral(
                    bot,
                    session.chat_id,
                    "You have already reported this account.",
                    config::notice::usage_delete(),
                )
                .await;
                return Ok(());
            }
            let mut merged = build_veto_preview(
                Some(existing),
                &target.subject,
                &feedback,
                &images,
                submitter_handle.as_deref(),
                &thresholds,
            );
            merged.submitted_by.push(submitter_hash);
            db::update_veto_content(
                &conn,
                merged.id,
                &merged.feedback,
                &merged.submitted_by,
                &merged.upvoters,
                &merged.images,
                merged.status,
            )?;
            if let (Some(chat_id), Some(message_id)) = (merged.chat_id, merged.message_id) {
                let _ = bot
                    .delete_message(ChatId(chat_id), MessageId(message_id as i32))
                    .await;
            }
            merged
        }
        None => {
            let upvoters: Vec<String> = submitter_handle.into_iter().collect();
            let status = derive_status(upvoters.len(), 0, &thresholds);
            db::create_veto(
                &conn,
                &target.subject,
                None,
                None,
                &[feedback],
                &[submitter_hash],
                &upvoters,
                &images,
                status,
            )?
        }
    };

    match publish_veto(bot, &record).await {
        Ok(published) => {
            db::update_veto_message(&conn, record.id, published.chat.id.0, published.id.0 as i64)?;
            send_ephemeral(
                bot,
                session.chat_id,
                &format!("Report on @{} submitted ✅", record.subject),
                config::notice::success_delete(),
            )
            .await;
        }
        Err(err) => {
            log::error!("Failed to publish veto for {}: {}", record.subject, err);
            send_ephemeral(
                bot,
                session.chat_id,
                "Report recorded, but publishing to the group failed.",
                config::notice::usage_delete(),
            )
            .await;
        }
    }
    Ok(())
}

/// Sends the vote message for a veto to the configured group.
pub async fn publish_veto(bot: &Bot, record: &VetoRecord) -> AppResult<Message> {
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
        .caption(caption::veto_caption(record))
        .parse_mode(ParseMode::Html)
        .reply_markup(caption::veto_vote_keyboard(record));
    if let Some(thread) = *config::VETO_THREAD_ID {
        request = request.message_thread_id(ThreadId(MessageId(thread)));
    }
    Ok(request.await?)
}

/// Applies a vote result to the published veto message.
pub async fn rerender_veto_message(bot: &Bot, record: &VetoRecord) -> AppResult<()> {
    use teloxide::types::ParseMode;

    let (Some(chat_id), Some(message_id)) = (record.chat_id, record.message_id) else {
        return Ok(());
    };
    let chat = ChatId(chat_id);
    let msg_id = MessageId(message_id as i32);
    let text = caption::veto_caption(record);
    let keyboard = caption::veto_vote_keyboard(record);

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

    fn existing() -> VetoRecord {
        VetoRecord {
            id: 3,
            subject: "target".to_string(),
            message_id: Some(20),
            chat_id: Some(-100),
            feedback: vec!["scammed me".to_string()],
            submitted_by: vec!["hash-a".to_string()],
            upvoters: vec!["carol".to_string()],
            downvoters: vec![],
            images: vec!["file-1".to_string()],
            status: RecordStatus::Pending,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn fresh_preview_counts_submitter_without_naming_them() {
        let preview = build_veto_preview(
            None,
            "target",
            "fake account",
            &[],
            Some("bob"),
            &thresholds(),
        );
        assert_eq!(preview.feedback, vec!["fake account"]);
        assert_eq!(preview.upvoters, vec!["bob"]);
        assert!(preview.submitted_by.is_empty());
        assert_eq!(preview.status, RecordStatus::Pending);
    }

    #[test]
    fn merge_preview_appends_feedback_and_images() {
        let preview = build_veto_preview(
            Some(existing()),
            "target",
            "fake account",
            &["file-2".to_string()],
            Some("bob"),
            &thresholds(),
        );
        assert_eq!(preview.feedback, vec!["scammed me", "fake account"]);
        assert_eq!(preview.images, vec!["file-1", "file-2"]);
        assert_eq!(preview.upvoters, vec!["carol", "bob"]);
    }

    #[test]
    fn merge_preview_does_not_double_vote_a_prior_voter() {
        let mut record = existing();
        record.downvoters.push("bob".to_string());
        let preview = build_veto_preview(
            Some(record),
            "target",
            "fake account",
            &[],
            Some("bob"),
            &thresholds(),
        );
        assert_eq!(preview.upvoters, vec!["carol"]);
        assert_eq!(preview.downvoters, vec!["bob"]);
    }
}
