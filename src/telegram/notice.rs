//! Short-lived notices that delete themselves after a delay.

use std::time::Duration;

use teloxide::prelude::*;

/// Sends a plain-text notice and schedules its deletion.
pub async fn send_ephemeral(bot: &Bot, chat_id: ChatId, text: &str, delay: Duration) {
    match bot.send_message(chat_id, text).await {
        Ok(msg) => {
            let bot = bot.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = bot.delete_message(chat_id, msg.id).await;
            });
        }
        Err(err) => log::warn!("Failed to send notice to {}: {}", chat_id, err),
    }
}

/// Deletes a batch of wizard messages best-effort.
pub async fn delete_messages(bot: &Bot, chat_id: ChatId, message_ids: &[teloxide::types::MessageId]) {
    for message_id in message_ids {
        let _ = bot.delete_message(chat_id, *message_id).await;
    }
}
