//! Access control: group membership and admin checks.
//! All checks are bypassed in the local development environment.

use teloxide::prelude::*;
use teloxide::types::{ChatMemberStatus, UserId};

use crate::core::config;

/// True when the user id is listed as an admin.
pub fn is_admin(user_id: UserId) -> bool {
    if config::is_development() {
        return true;
    }
    i64::try_from(user_id.0)
        .map(|id| config::admin::ADMIN_IDS.contains(&id))
        .unwrap_or(false)
}

/// True when the user is a member, administrator or owner of the
/// configured group. Lookup failures count as not a member.
pub async fn is_group_member(bot: &Bot, user_id: UserId) -> bool {
    if config::is_development() {
        return true;
    }
    let group_id = *config::ALLOWED_GROUP_ID;
    if group_id == 0 {
        return false;
    }
    match bot.get_chat_member(ChatId(group_id), user_id).await {
        Ok(member) => matches!(
            member.status(),
            ChatMemberStatus::Owner | ChatMemberStatus::Administrator | ChatMemberStatus::Member
        ),
        Err(err) => {
            log::warn!("Membership lookup failed for user {}: {}", user_id, err);
            false
        }
    }
}

/// True when the message arrived in a private chat.
pub fn is_private_chat(msg: &teloxide::types::Message) -> bool {
    msg.chat.is_private()
}
