//! Caption and keyboard rendering for vote messages and wizard screens.
//! All captions use HTML parse mode.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use teloxide::utils::html;

use crate::records::RecordStatus;
use crate::storage::db::{VetoRecord, VouchRecord};

fn status_line(status: RecordStatus) -> String {
    let label = match status {
        RecordStatus::Pending => "Pending",
        RecordStatus::Approved => "Approved",
        RecordStatus::Rejected => "Rejected",
    };
    format!("Status: {} {}", status.glyph(), label)
}

fn subject_link(subject: &str) -> String {
    format!(
        "<a href=\"https://x.com/{}\">@{}</a>",
        html::escape(subject),
        html::escape(subject)
    )
}

fn handle_list(handles: &[String]) -> String {
    handles
        .iter()
        .map(|h| format!("@{}", html::escape(h)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders the published vouch vote caption.
pub fn vouch_caption(record: &VouchRecord) -> String {
    let mut caption = format!("Voting for: {}\n", subject_link(&record.subject));
    if !record.vouchers.is_empty() {
        caption.push_str(&format!("\nVouched by: {}\n", handle_list(&record.vouchers)));
    }
    if let Some(description) = record.description.as_deref().filter(|d| !d.trim().is_empty()) {
        caption.push_str(&format!("\nDescription:\n{}\n", html::escape(description)));
    }
    caption.push_str(&format!(
        "\nCurrent votes:\n✅ Upvotes: {}\n❌ Downvotes: {}\n",
        record.upvoters.len(),
        record.downvoters.len()
    ));
    caption.push('\n');
    caption.push_str(&status_line(record.status));
    caption
}

/// Renders the published veto vote caption. Submitters stay anonymous;
/// only the feedback entries appear.
pub fn veto_caption(record: &VetoRecord) -> String {
    let mut caption = format!("⚠️ Veto report for: {}\n", subject_link(&record.subject));
    if !record.feedback.is_empty() {
        caption.push_str("\nFeedback:\n");
        for (idx, entry) in record.feedback.iter().enumerate() {
            caption.push_str(&format!("{}. {}\n", idx + 1, html::escape(entry)));
        }
    }
    caption.push_str(&format!(
        "\nCurrent votes:\n👢 Kick: {}\n✅ Keep: {}\n",
        record.upvoters.len(),
        record.downvoters.len()
    ));
    caption.push('\n');
    caption.push_str(&status_line(record.status));
    caption
}

/// Review-screen caption for a vouch: the caption exactly as it would
/// be published, with the caller's vote already counted, plus the
/// irreversible-submit warning.
pub fn vouch_review_caption(preview: &VouchRecord, merging: bool) -> String {
    let mut text = vouch_caption(preview);
    text.push_str("\n\n🔍 <b>Preview of the published vouch</b>");
    if merging {
        text.push_str("\nYour vouch will be merged into the existing record shown above.");
    }
    text.push_str("\n\n<b>⚠️ Submitting is irreversible.</b>");
    text
}

/// Review-screen caption for a veto. `attached` is the number of images
/// the submitter attached in this wizard run; with none, the published
/// message falls back to the account's profile picture.
pub fn veto_review_caption(preview: &VetoRecord, attached: usize, merging: bool) -> String {
    let mut text = veto_caption(preview);
    text.push_str("\n\n🔍 <b>Preview of the published report</b>");
    if attached > 0 {
        text.push_str(&format!("\nImages: {attached} attached"));
    } else {
        text.push_str("\nImages: the account's profile picture will be used");
    }
    if merging {
        text.push_str("\nYour report will be merged into the existing record shown above.");
    }
    text.push_str("\n\n<b>⚠️ Submitting is irreversible.</b>");
    text
}

/// Vote keyboard under a published vouch.
pub fn vouch_vote_keyboard(record: &VouchRecord) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(format!("✅ ({})", record.upvoters.len()), "vote:up"),
        InlineKeyboardButton::callback(format!("❌ ({})", record.downvoters.len()), "vote:down"),
    ]])
}

/// Vote keyboard under a published veto.
pub fn veto_vote_keyboard(record: &VetoRecord) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(format!("👢 Kick ({})", record.upvoters.len()), "rvote:up"),
        InlineKeyboardButton::callback(format!("✅ Keep ({})", record.downvoters.len()), "rvote:down"),
    ]])
}

fn row(buttons: &[(&str, &str)]) -> Vec<InlineKeyboardButton> {
    buttons
        .iter()
        .map(|(label, data)| InlineKeyboardButton::callback(label.to_string(), data.to_string()))
        .collect()
}

/// Keyboard for the vouch username confirmation screen.
pub fn vouch_username_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("✏️ Edit", "vouch:edit_user"), ("➡️ Continue", "vouch:confirm_user")]),
        row(&[("🚫 Cancel", "vouch:cancel")]),
    ])
}

/// Keyboard for the vouch description prompt.
pub fn vouch_description_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("⏭ Skip", "vouch:skip_description")]),
        row(&[("🚫 Cancel", "vouch:cancel")]),
    ])
}

/// Keyboard for the vouch review screen.
pub fn vouch_review_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("✏️ Username", "vouch:edit_user"), ("✏️ Description", "vouch:edit_description")]),
        row(&[("✅ Submit", "vouch:submit"), ("🚫 Cancel", "vouch:cancel")]),
    ])
}

/// Keyboard for the veto username confirmation screen.
pub fn veto_username_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("✏️ Edit", "veto:edit_user"), ("➡️ Continue", "veto:confirm_user")]),
        row(&[("🚫 Cancel", "veto:cancel")]),
    ])
}

/// Keyboard for the veto feedback prompt.
pub fn veto_feedback_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![row(&[("🚫 Cancel", "veto:cancel")])])
}

/// Cancel-only keyboard for free-text prompts; `prefix` selects which
/// wizard the cancel button belongs to.
pub fn wizard_cancel_keyboard(prefix: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🚫 Cancel".to_string(),
        format!("{prefix}:cancel"),
    )]])
}

/// Keyboard for the veto image collection screen.
pub fn veto_images_keyboard(count: usize) -> InlineKeyboardMarkup {
    let done_label = if count == 0 {
        "⏭ Skip images".to_string()
    } else {
        format!("✅ Done ({count} attached)")
    };
    InlineKeyboardMarkup::new(vec![
        row(&[(done_label.as_str(), "veto:done_images")]),
        row(&[("🚫 Cancel", "veto:cancel")]),
    ])
}

/// Keyboard for the veto review screen.
pub fn veto_review_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("✏️ Modify", "veto:modify"), ("✅ Submit", "veto:submit")]),
        row(&[("🚫 Cancel", "veto:cancel")]),
    ])
}

/// Keyboard for the veto modify menu.
pub fn veto_modify_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("👤 Username", "veto:modify_user"), ("📝 Feedback", "veto:modify_feedback")]),
        row(&[("🖼 Images", "veto:modify_images"), ("⬅️ Back", "veto:back_review")]),
    ])
}

/// Keyboard for the /start menu.
pub fn start_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        row(&[("⚠️ Report an account", "start:veto")]),
        row(&[("📋 List records", "start:list"), ("❓ Help", "start:help")]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordStatus;
    use pretty_assertions::assert_eq;

    fn vouch(subject: &str) -> VouchRecord {
        VouchRecord {
            id: 1,
            subject: subject.to_string(),
            message_id: None,
            chat_id: None,
            created_by: "alice".to_string(),
            vouchers: vec!["alice".to_string()],
            upvoters: vec!["alice".to_string()],
            downvoters: vec![],
            status: RecordStatus::Pending,
            description: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn vouch_caption_links_subject_and_counts_votes() {
        let mut record = vouch("target");
        record.description = Some("Known good trader".to_string());
        let caption = vouch_caption(&record);
        assert!(caption.contains("<a href=\"https://x.com/target\">@target</a>"));
        assert!(caption.contains("Vouched by: @alice"));
        assert!(caption.contains("Description:\nKnown good trader"));
        assert!(caption.contains("✅ Upvotes: 1"));
        assert!(caption.contains("❌ Downvotes: 0"));
        assert!(caption.contains("Status: ⏳ Pending"));
    }

    #[test]
    fn vouch_caption_omits_empty_description() {
        let caption = vouch_caption(&vouch("target"));
        assert!(!caption.contains("Description:"));
    }

    #[test]
    fn caption_escapes_html_in_description() {
        let mut record = vouch("target");
        record.description = Some("a <b> & c".to_string());
        let caption = vouch_caption(&record);
        assert!(caption.contains("a &lt;b&gt; &amp; c"));
    }

    #[test]
    fn veto_caption_numbers_feedback_and_hides_submitters() {
        let record = VetoRecord {
            id: 1,
            subject: "target".to_string(),
            message_id: None,
            chat_id: None,
            feedback: vec!["scammed me".to_string(), "fake account".to_string()],
            submitted_by: vec!["deadbeef".to_string()],
            upvoters: vec!["a".to_string(), "b".to_string()],
            downvoters: vec![],
            images: vec![],
            status: RecordStatus::Pending,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let caption = veto_caption(&record);
        assert!(caption.contains("1. scammed me"));
        assert!(caption.contains("2. fake account"));
        assert!(caption.contains("👢 Kick: 2"));
        assert!(caption.contains("✅ Keep: 0"));
        assert!(!caption.contains("deadbeef"));
    }

    #[test]
    fn vouch_review_caption_shows_counts_status_and_warning() {
        let mut record = vouch("alice");
        record.description = Some("great trader".to_string());
        let text = vouch_review_caption(&record, false);
        assert!(text.contains("@alice"));
        assert!(text.contains("great trader"));
        assert!(text.contains("✅ Upvotes: 1"));
        assert!(text.contains("❌ Downvotes: 0"));
        assert!(text.contains("Status: ⏳ Pending"));
        assert!(text.contains("irreversible"));
        assert!(!text.contains("merged"));
    }

    #[test]
    fn vouch_review_caption_notes_merge() {
        let text = vouch_review_caption(&vouch("alice"), true);
        assert!(text.contains("merged into the existing record"));
    }

    #[test]
    fn veto_review_caption_without_images_uses_profile_picture() {
        let record = VetoRecord {
            id: 1,
            subject: "target".to_string(),
            message_id: None,
            chat_id: None,
            feedback: vec!["scammed me".to_string()],
            submitted_by: vec!["deadbeef".to_string()],
            upvoters: vec!["a".to_string()],
            downvoters: vec![],
            images: vec![],
            status: RecordStatus::Pending,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let text = veto_review_caption(&record, 0, false);
        assert!(text.contains("profile picture will be used"));
        assert!(text.contains("👢 Kick: 1"));
        assert!(text.contains("irreversible"));

        let with_images = veto_review_caption(&record, 3, false);
        assert!(with_images.contains("Images: 3 attached"));
    }

    #[test]
    fn vote_keyboards_show_current_counts() {
        let record = vouch("target");
        let kb = vouch_vote_keyboard(&record);
        let labels: Vec<String> = kb.inline_keyboard[0].iter().map(|b| b.text.clone()).collect();
        assert_eq!(labels, vec!["✅ (1)", "❌ (0)"]);
    }
}
