//! Admin batch updater: recomputes record statuses against the current
//! thresholds and republishes only the captions that actually changed.
//! Jobs run strictly in FIFO order, one at a time, with a fixed delay
//! between caption edits to stay under outbound rate limits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use teloxide::prelude::*;
use tokio::sync::Mutex;

use crate::core::config;
use crate::core::error::AppResult;
use crate::records::{derive_status, Thresholds};
use crate::storage::db::{self, DbConnection, DbPool};
use crate::telegram::{veto, vouch};

/// One queued batch update request.
#[derive(Debug, Clone)]
pub struct UpdateJob {
    /// Chat where progress and the summary are reported
    pub chat_id: ChatId,
    /// New thresholds to persist before recomputing, if any
    pub new_thresholds: Option<Thresholds>,
    /// Only records created within this many days are touched
    pub days: i64,
}

/// FIFO queue of batch update jobs.
pub struct UpdateQueue {
    jobs: Mutex<VecDeque<UpdateJob>>,
    busy: AtomicBool,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// Adds a job to the back of the queue and reports its position.
    pub async fn enqueue(&self, job: UpdateJob) -> usize {
        let mut jobs = self.jobs.lock().await;
        jobs.push_back(job);
        jobs.len()
    }

    pub async fn pop(&self) -> Option<UpdateJob> {
        self.jobs.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// True while the worker is inside a job.
    pub fn is_processing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn set_processing(&self, value: bool) {
        self.busy.store(value, Ordering::Release);
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the single worker that drains the queue.
pub fn spawn_worker(queue: Arc<UpdateQueue>, bot: Bot, db_pool: Arc<DbPool>) {
    tokio::spawn(async move {
        loop {
            let Some(job) = queue.pop().await else {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                continue;
            };
            queue.set_processing(true);
            if let Err(err) = run_job(&bot, &db_pool, &job).await {
                log::error!("Batch update failed: {}", err);
                let _ = bot
                    .send_message(job.chat_id, format!("Batch update failed: {err}"))
                    .await;
            }
            queue.set_processing(false);
        }
    });
}

/// A single status change produced by a recompute pass.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub kind: RecordKind,
    pub id: i64,
    pub subject: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Vouch,
    Veto,
}

/// Outcome of a recompute pass.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    pub changes: Vec<StatusChange>,
    /// How many records were examined, changed or not
    pub scanned: usize,
}

/// Recomputes statuses in the database and returns what changed.
/// Records whose status is already correct are left untouched.
pub fn refresh_statuses(
    conn: &DbConnection,
    thresholds: &Thresholds,
    days: i64,
) -> AppResult<RefreshReport> {
    let mut changes = Vec::new();
    let mut scanned = 0usize;

    for record in db::list_vouches_since(conn, days)? {
        scanned += 1;
        let status = derive_status(record.upvoters.len(), record.downvoters.len(), thresholds);
        if status != record.status {
            db::update_vouch_status(conn, record.id, status)?;
            changes.push(StatusChange {
                kind: RecordKind::Vouch,
                id: record.id,
                subject: record.subject,
            });
        }
    }
    for record in db::list_vetoes_since(conn, days)? {
        scanned += 1;
        let status = derive_status(record.upvoters.len(), record.downvoters.len(), thresholds);
        if status != record.status {
            db::update_veto_votes(
                conn,
                record.id,
                &record.upvoters,
                &record.downvoters,
                status,
            )?;
            changes.push(StatusChange {
                kind: RecordKind::Veto,
                id: record.id,
                subject: record.subject,
            });
        }
    }

    Ok(RefreshReport { changes, scanned })
}

async fn run_job(bot: &Bot, db_pool: &Arc<DbPool>, job: &UpdateJob) -> AppResult<()> {
    let conn = db::get_connection(db_pool)?;

    if let Some(ref thresholds) = job.new_thresholds {
        db::create_settings(&conn, thresholds)?;
    }
    let thresholds = db::current_thresholds(&conn)?;

    let report = refresh_statuses(&conn, &thresholds, job.days)?;
    let total = report.changes.len();

    let progress = bot
        .send_message(
            job.chat_id,
            format!("Updating statuses: 0/{total} republished"),
        )
        .await?;

    let mut republished = 0usize;
    let mut errors = 0usize;
    for (idx, change) in report.changes.iter().enumerate() {
        let rendered = match change.kind {
            RecordKind::Vouch => match db::find_vouch_by_subject(&conn, &change.subject)? {
                Some(record) => vouch::rerender_vouch_message(bot, &record).await,
                None => Ok(()),
            },
            RecordKind::Veto => match db::find_veto_by_subject(&conn, &change.subject)? {
                Some(record) => veto::rerender_veto_message(bot, &record).await,
                None => Ok(()),
            },
        };
        match rendered {
            Ok(()) => republished += 1,
            Err(err) => {
                errors += 1;
                log::warn!("Failed to republish {}: {}", change.subject, err);
            }
        }

        if (idx + 1) % config::batch::PROGRESS_EVERY == 0 {
            let _ = bot
                .edit_message_text(
                    job.chat_id,
                    progress.id,
                    format!("Updating statuses: {}/{total} republished", idx + 1),
                )
                .await;
        }
        if idx + 1 < total {
            tokio::time::sleep(config::batch::inter_edit_delay()).await;
        }
    }

    let summary = format!(
        "Status update done. {republished} republished, {errors} failed, {} unchanged records skipped.",
        report.scanned.saturating_sub(total)
    );
    let _ = bot.edit_message_text(job.chat_id, progress.id, summary).await;

    // The report cleans itself up after a short while.
    let bot = bot.clone();
    let chat_id = job.chat_id;
    let message_id = progress.id;
    tokio::spawn(async move {
        tokio::time::sleep(config::notice::batch_cleanup()).await;
        let _ = bot.delete_message(chat_id, message_id).await;
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn queue_is_fifo_and_reports_position() {
        let queue = UpdateQueue::new();
        assert!(queue.is_empty().await);
        assert!(!queue.is_processing());

        let first_position = queue
            .enqueue(UpdateJob {
                chat_id: ChatId(1),
                new_thresholds: Some(Thresholds {
                    required_upvotes: 5,
                    required_downvotes: 2,
                }),
                days: 30,
            })
            .await;
        let second_position = queue
            .enqueue(UpdateJob {
                chat_id: ChatId(2),
                new_thresholds: None,
                days: 7,
            })
            .await;
        assert_eq!(first_position, 1);
        assert_eq!(second_position, 2);
        assert_eq!(queue.len().await, 2);

        let first = queue.pop().await.unwrap();
        assert_eq!(first.chat_id, ChatId(1));
        let thresholds = first.new_thresholds.unwrap();
        assert_eq!(thresholds.required_upvotes, 5);
        assert_eq!(thresholds.required_downvotes, 2);

        let second = queue.pop().await.unwrap();
        assert_eq!(second.chat_id, ChatId(2));
        assert!(second.new_thresholds.is_none());
        assert!(queue.pop().await.is_none());
    }

    #[test]
    fn processing_flag_tracks_the_worker() {
        let queue = UpdateQueue::new();
        assert!(!queue.is_processing());
        queue.set_processing(true);
        assert!(queue.is_processing());
        queue.set_processing(false);
        assert!(!queue.is_processing());
    }
}
