//! In-memory wizard session tracking. Each user has at most one active
//! session per store; sessions older than the idle threshold are swept
//! on a timer so abandoned wizards do not pin memory or block the user
//! forever.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use teloxide::types::{ChatId, MessageId, UserId};
use tokio::sync::Mutex;

use crate::core::config;

/// One in-flight wizard for one user.
#[derive(Debug, Clone)]
pub struct Session<S> {
    pub user_id: UserId,
    /// Private chat the wizard runs in
    pub chat_id: ChatId,
    pub step: S,
    /// The message being live-edited as the wizard advances
    pub main_message_id: Option<MessageId>,
    /// Every message the wizard produced, deleted on finish or cancel
    pub message_ids: Vec<MessageId>,
    /// Expiry is keyed to creation, not last activity; a wizard that is
    /// still being poked after the threshold expires anyway.
    created_at: Instant,
}

/// Starting a session fails when the user already has one running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAlreadyActive;

/// Per-wizard session store keyed by user id. Stores for different
/// wizards are independent, so a vouch session and a veto session can
/// coexist for the same user.
pub struct SessionStore<S> {
    sessions: Mutex<HashMap<UserId, Session<S>>>,
    idle_timeout: Duration,
}

impl<S: Clone + Send + 'static> SessionStore<S> {
    pub fn new() -> Self {
        Self::with_timeout(config::session::idle_timeout())
    }

    pub fn with_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Starts a session at the given initial step.
    /// Refuses when the user already has an active session.
    pub async fn start(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        step: S,
    ) -> Result<(), SessionAlreadyActive> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&user_id) {
            return Err(SessionAlreadyActive);
        }
        sessions.insert(
            user_id,
            Session {
                user_id,
                chat_id,
                step,
                main_message_id: None,
                message_ids: Vec::new(),
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Returns a snapshot of the user's session, if any.
    pub async fn get(&self, user_id: UserId) -> Option<Session<S>> {
        self.sessions.lock().await.get(&user_id).cloned()
    }

    /// Mutates the session in place.
    /// Returns the updated snapshot, or None if no session exists.
    pub async fn update<F>(&self, user_id: UserId, mutate: F) -> Option<Session<S>>
    where
        F: FnOnce(&mut Session<S>),
    {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(&user_id)?;
        mutate(session);
        Some(session.clone())
    }

    /// Removes the session and returns it so callers can clean up its
    /// tracked messages.
    pub async fn clear(&self, user_id: UserId) -> Option<Session<S>> {
        self.sessions.lock().await.remove(&user_id)
    }

    /// Records a message for deletion when the wizard ends.
    pub async fn track_message(&self, user_id: UserId, message_id: MessageId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&user_id) {
            if !session.message_ids.contains(&message_id) {
                session.message_ids.push(message_id);
            }
        }
    }

    /// Marks the live-edited wizard message.
    pub async fn set_main_message(&self, user_id: UserId, message_id: MessageId) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&user_id) {
            session.main_message_id = Some(message_id);
            if !session.message_ids.contains(&message_id) {
                session.message_ids.push(message_id);
            }
        }
    }

    /// Drops sessions created longer ago than the timeout and returns
    /// them, so the caller can delete their leftover messages.
    pub async fn sweep_expired(&self) -> Vec<Session<S>> {
        let mut sessions = self.sessions.lock().await;
        let now = Instant::now();
        let expired: Vec<UserId> = sessions
            .iter()
            .filter(|(_, s)| now.duration_since(s.created_at) >= self.idle_timeout)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id))
            .collect()
    }

    /// Backdates the creation time. Test hook for expiry behavior.
    #[cfg(test)]
    pub async fn age_session(&self, user_id: UserId, by: Duration) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&user_id) {
            session.created_at -= by;
        }
    }
}

impl<S: Clone + Send + 'static> Default for SessionStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the periodic expiry sweep for a store. Expired sessions have
/// their tracked wizard messages deleted best-effort.
pub fn spawn_sweep_task<S: Clone + Send + Sync + 'static>(
    store: Arc<SessionStore<S>>,
    bot: teloxide::Bot,
) {
    use teloxide::prelude::*;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config::session::sweep_interval());
        interval.tick().await;
        loop {
            interval.tick().await;
            let expired = store.sweep_expired().await;
            for session in expired {
                log::info!("Sweeping expired wizard session for user {}", session.user_id);
                for message_id in &session.message_ids {
                    let _ = bot.delete_message(session.chat_id, *message_id).await;
                }
            }
        }
    });
}
