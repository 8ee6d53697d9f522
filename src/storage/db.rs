use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Result;

use crate::records::{RecordStatus, Thresholds};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// A vouch record: a community endorsement of one subject handle.
#[derive(Debug, Clone)]
pub struct VouchRecord {
    pub id: i64,
    /// Normalized (lowercase) handle of the vouched account
    pub subject: String,
    /// Live vote message in the group, if one is currently published
    pub message_id: Option<i64>,
    pub chat_id: Option<i64>,
    /// Telegram handle of the member who started the vouch
    pub created_by: String,
    /// Handles of everyone who has vouched (merged on duplicates)
    pub vouchers: Vec<String>,
    pub upvoters: Vec<String>,
    pub downvoters: Vec<String>,
    pub status: RecordStatus,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A veto record: a community report against one subject handle.
#[derive(Debug, Clone)]
pub struct VetoRecord {
    pub id: i64,
    pub subject: String,
    pub message_id: Option<i64>,
    pub chat_id: Option<i64>,
    /// Feedback entries, one per submitter (merged on duplicates)
    pub feedback: Vec<String>,
    /// One-way hashes of submitter user ids, to reject repeat reports
    pub submitted_by: Vec<String>,
    pub upvoters: Vec<String>,
    pub downvoters: Vec<String>,
    /// Telegram file ids of attached evidence images
    pub images: Vec<String>,
    pub status: RecordStatus,
    pub created_at: String,
    pub updated_at: String,
}

fn json_vec(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn to_json(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and ensures
/// the schema exists.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    if let Err(e) = init_schema(&conn) {
        log::warn!("Failed to initialize schema: {}", e);
    }

    Ok(pool)
}

/// Get a connection from the pool
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Creates the tables if they do not exist yet. Idempotent.
pub fn init_schema(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vouches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL UNIQUE COLLATE NOCASE,
            message_id INTEGER,
            chat_id INTEGER,
            created_by TEXT NOT NULL,
            vouchers TEXT NOT NULL DEFAULT '[]',
            upvoters TEXT NOT NULL DEFAULT '[]',
            downvoters TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'pending',
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS vetoes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT NOT NULL UNIQUE COLLATE NOCASE,
            message_id INTEGER,
            chat_id INTEGER,
            feedback TEXT NOT NULL DEFAULT '[]',
            submitted_by TEXT NOT NULL DEFAULT '[]',
            upvoters TEXT NOT NULL DEFAULT '[]',
            downvoters TEXT NOT NULL DEFAULT '[]',
            images TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            required_upvotes INTEGER NOT NULL,
            required_downvotes INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn vouch_from_row(row: &rusqlite::Row<'_>) -> Result<VouchRecord> {
    Ok(VouchRecord {
        id: row.get(0)?,
        subject: row.get(1)?,
        message_id: row.get(2)?,
        chat_id: row.get(3)?,
        created_by: row.get(4)?,
        vouchers: json_vec(&row.get::<_, String>(5)?),
        upvoters: json_vec(&row.get::<_, String>(6)?),
        downvoters: json_vec(&row.get::<_, String>(7)?),
        status: RecordStatus::from_str(&row.get::<_, String>(8)?),
        description: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const VOUCH_COLUMNS: &str = "id, subject, message_id, chat_id, created_by, vouchers, upvoters, downvoters, status, description, created_at, updated_at";

/// Finds a vouch by its subject handle, case-insensitively.
pub fn find_vouch_by_subject(conn: &DbConnection, subject: &str) -> Result<Option<VouchRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VOUCH_COLUMNS} FROM vouches WHERE subject = ? COLLATE NOCASE"
    ))?;
    let mut rows = stmt.query(&[&subject as &dyn rusqlite::ToSql])?;
    match rows.next()? {
        Some(row) => Ok(Some(vouch_from_row(row)?)),
        None => Ok(None),
    }
}

/// Finds the vouch whose live vote message is the given one.
pub fn find_vouch_by_message(
    conn: &DbConnection,
    chat_id: i64,
    message_id: i64,
) -> Result<Option<VouchRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VOUCH_COLUMNS} FROM vouches WHERE chat_id = ? AND message_id = ?"
    ))?;
    let mut rows = stmt.query(&[
        &chat_id as &dyn rusqlite::ToSql,
        &message_id as &dyn rusqlite::ToSql,
    ])?;
    match rows.next()? {
        Some(row) => Ok(Some(vouch_from_row(row)?)),
        None => Ok(None),
    }
}

/// Inserts a fresh vouch record and returns it.
#[allow(clippy::too_many_arguments)]
pub fn create_vouch(
    conn: &DbConnection,
    subject: &str,
    message_id: Option<i64>,
    chat_id: Option<i64>,
    created_by: &str,
    vouchers: &[String],
    upvoters: &[String],
    description: Option<&str>,
    status: RecordStatus,
) -> Result<VouchRecord> {
    let ts = now();
    conn.execute(
        "INSERT INTO vouches (subject, message_id, chat_id, created_by, vouchers, upvoters, downvoters, status, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?8, ?9, ?9)",
        &[
            &subject as &dyn rusqlite::ToSql,
            &message_id as &dyn rusqlite::ToSql,
            &chat_id as &dyn rusqlite::ToSql,
            &created_by as &dyn rusqlite::ToSql,
            &to_json(vouchers) as &dyn rusqlite::ToSql,
            &to_json(upvoters) as &dyn rusqlite::ToSql,
            &status.as_str() as &dyn rusqlite::ToSql,
            &description as &dyn rusqlite::ToSql,
            &ts as &dyn rusqlite::ToSql,
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_vouch_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

fn find_vouch_by_id(conn: &DbConnection, id: i64) -> Result<Option<VouchRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {VOUCH_COLUMNS} FROM vouches WHERE id = ?"))?;
    let mut rows = stmt.query(&[&id as &dyn rusqlite::ToSql])?;
    match rows.next()? {
        Some(row) => Ok(Some(vouch_from_row(row)?)),
        None => Ok(None),
    }
}

/// Persists merged vouch content after a duplicate submission or a wizard edit.
pub fn update_vouch_content(
    conn: &DbConnection,
    id: i64,
    vouchers: &[String],
    upvoters: &[String],
    description: Option<&str>,
    status: RecordStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE vouches SET vouchers = ?1, upvoters = ?2, description = ?3, status = ?4, updated_at = ?5 WHERE id = ?6",
        &[
            &to_json(vouchers) as &dyn rusqlite::ToSql,
            &to_json(upvoters) as &dyn rusqlite::ToSql,
            &description as &dyn rusqlite::ToSql,
            &status.as_str() as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

/// Records where the vouch's live vote message now lives.
pub fn update_vouch_message(
    conn: &DbConnection,
    id: i64,
    chat_id: i64,
    message_id: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE vouches SET chat_id = ?1, message_id = ?2, updated_at = ?3 WHERE id = ?4",
        &[
            &chat_id as &dyn rusqlite::ToSql,
            &message_id as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

/// Retargets the vouch to a new subject. Callers must first check no
/// other vouch exists for that subject, or the UNIQUE index fires.
pub fn update_vouch_subject(conn: &DbConnection, id: i64, subject: &str) -> Result<()> {
    conn.execute(
        "UPDATE vouches SET subject = ?1, updated_at = ?2 WHERE id = ?3",
        &[
            &subject as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

/// Persists the voter lists and derived status after a vote press.
pub fn update_vouch_votes(
    conn: &DbConnection,
    id: i64,
    upvoters: &[String],
    downvoters: &[String],
    status: RecordStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE vouches SET upvoters = ?1, downvoters = ?2, status = ?3, updated_at = ?4 WHERE id = ?5",
        &[
            &to_json(upvoters) as &dyn rusqlite::ToSql,
            &to_json(downvoters) as &dyn rusqlite::ToSql,
            &status.as_str() as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

pub fn update_vouch_status(conn: &DbConnection, id: i64, status: RecordStatus) -> Result<()> {
    conn.execute(
        "UPDATE vouches SET status = ?1, updated_at = ?2 WHERE id = ?3",
        &[
            &status.as_str() as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

pub fn delete_vouch(conn: &DbConnection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM vouches WHERE id = ?", &[&id as &dyn rusqlite::ToSql])?;
    Ok(())
}

/// Lists vouches created within the last `days` days, oldest first.
pub fn list_vouches_since(conn: &DbConnection, days: i64) -> Result<Vec<VouchRecord>> {
    let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
    let mut stmt = conn.prepare(&format!(
        "SELECT {VOUCH_COLUMNS} FROM vouches WHERE created_at >= ? ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map(&[&cutoff as &dyn rusqlite::ToSql], vouch_from_row)?;
    rows.collect()
}

/// Lists every vouch, newest first.
pub fn list_all_vouches(conn: &DbConnection) -> Result<Vec<VouchRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VOUCH_COLUMNS} FROM vouches ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], vouch_from_row)?;
    rows.collect()
}

/// Lists vetoes created within the last `days` days, oldest first.
pub fn list_vetoes_since(conn: &DbConnection, days: i64) -> Result<Vec<VetoRecord>> {
    let cutoff = (Utc::now() - chrono::Duration::days(days)).to_rfc3339();
    let mut stmt = conn.prepare(&format!(
        "SELECT {VETO_COLUMNS} FROM vetoes WHERE created_at >= ? ORDER BY created_at ASC"
    ))?;
    let rows = stmt.query_map(&[&cutoff as &dyn rusqlite::ToSql], veto_from_row)?;
    rows.collect()
}

/// Lists the vetoes carrying the given submitter hash, newest first.
pub fn list_vetoes_by_submitter(
    conn: &DbConnection,
    submitter_hash: &str,
) -> Result<Vec<VetoRecord>> {
    Ok(list_all_vetoes(conn)?
        .into_iter()
        .filter(|record| veto_has_submitter(record, submitter_hash))
        .collect())
}

/// Lists every veto, newest first.
pub fn list_all_vetoes(conn: &DbConnection) -> Result<Vec<VetoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VETO_COLUMNS} FROM vetoes ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map([], veto_from_row)?;
    rows.collect()
}

const VETO_COLUMNS: &str = "id, subject, message_id, chat_id, feedback, submitted_by, upvoters, downvoters, images, status, created_at, updated_at";

fn veto_from_row(row: &rusqlite::Row<'_>) -> Result<VetoRecord> {
    Ok(VetoRecord {
        id: row.get(0)?,
        subject: row.get(1)?,
        message_id: row.get(2)?,
        chat_id: row.get(3)?,
        feedback: json_vec(&row.get::<_, String>(4)?),
        submitted_by: json_vec(&row.get::<_, String>(5)?),
        upvoters: json_vec(&row.get::<_, String>(6)?),
        downvoters: json_vec(&row.get::<_, String>(7)?),
        images: json_vec(&row.get::<_, String>(8)?),
        status: RecordStatus::from_str(&row.get::<_, String>(9)?),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn find_veto_by_subject(conn: &DbConnection, subject: &str) -> Result<Option<VetoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VETO_COLUMNS} FROM vetoes WHERE subject = ? COLLATE NOCASE"
    ))?;
    let mut rows = stmt.query(&[&subject as &dyn rusqlite::ToSql])?;
    match rows.next()? {
        Some(row) => Ok(Some(veto_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn find_veto_by_message(
    conn: &DbConnection,
    chat_id: i64,
    message_id: i64,
) -> Result<Option<VetoRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VETO_COLUMNS} FROM vetoes WHERE chat_id = ? AND message_id = ?"
    ))?;
    let mut rows = stmt.query(&[
        &chat_id as &dyn rusqlite::ToSql,
        &message_id as &dyn rusqlite::ToSql,
    ])?;
    match rows.next()? {
        Some(row) => Ok(Some(veto_from_row(row)?)),
        None => Ok(None),
    }
}

fn find_veto_by_id(conn: &DbConnection, id: i64) -> Result<Option<VetoRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {VETO_COLUMNS} FROM vetoes WHERE id = ?"))?;
    let mut rows = stmt.query(&[&id as &dyn rusqlite::ToSql])?;
    match rows.next()? {
        Some(row) => Ok(Some(veto_from_row(row)?)),
        None => Ok(None),
    }
}

/// Inserts a fresh veto record and returns it.
#[allow(clippy::too_many_arguments)]
pub fn create_veto(
    conn: &DbConnection,
    subject: &str,
    message_id: Option<i64>,
    chat_id: Option<i64>,
    feedback: &[String],
    submitted_by: &[String],
    upvoters: &[String],
    images: &[String],
    status: RecordStatus,
) -> Result<VetoRecord> {
    let ts = now();
    conn.execute(
        "INSERT INTO vetoes (subject, message_id, chat_id, feedback, submitted_by, upvoters, downvoters, images, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?8, ?9, ?9)",
        &[
            &subject as &dyn rusqlite::ToSql,
            &message_id as &dyn rusqlite::ToSql,
            &chat_id as &dyn rusqlite::ToSql,
            &to_json(feedback) as &dyn rusqlite::ToSql,
            &to_json(submitted_by) as &dyn rusqlite::ToSql,
            &to_json(upvoters) as &dyn rusqlite::ToSql,
            &to_json(images) as &dyn rusqlite::ToSql,
            &status.as_str() as &dyn rusqlite::ToSql,
            &ts as &dyn rusqlite::ToSql,
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_veto_by_id(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Persists merged veto content after a duplicate submission.
#[allow(clippy::too_many_arguments)]
pub fn update_veto_content(
    conn: &DbConnection,
    id: i64,
    feedback: &[String],
    submitted_by: &[String],
    upvoters: &[String],
    images: &[String],
    status: RecordStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE vetoes SET feedback = ?1, submitted_by = ?2, upvoters = ?3, images = ?4, status = ?5, updated_at = ?6 WHERE id = ?7",
        &[
            &to_json(feedback) as &dyn rusqlite::ToSql,
            &to_json(submitted_by) as &dyn rusqlite::ToSql,
            &to_json(upvoters) as &dyn rusqlite::ToSql,
            &to_json(images) as &dyn rusqlite::ToSql,
            &status.as_str() as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

pub fn update_veto_message(
    conn: &DbConnection,
    id: i64,
    chat_id: i64,
    message_id: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE vetoes SET chat_id = ?1, message_id = ?2, updated_at = ?3 WHERE id = ?4",
        &[
            &chat_id as &dyn rusqlite::ToSql,
            &message_id as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

pub fn update_veto_votes(
    conn: &DbConnection,
    id: i64,
    upvoters: &[String],
    downvoters: &[String],
    status: RecordStatus,
) -> Result<()> {
    conn.execute(
        "UPDATE vetoes SET upvoters = ?1, downvoters = ?2, status = ?3, updated_at = ?4 WHERE id = ?5",
        &[
            &to_json(upvoters) as &dyn rusqlite::ToSql,
            &to_json(downvoters) as &dyn rusqlite::ToSql,
            &status.as_str() as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
            &id as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}

pub fn delete_veto(conn: &DbConnection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM vetoes WHERE id = ?", &[&id as &dyn rusqlite::ToSql])?;
    Ok(())
}

/// Checks whether a hashed submitter already reported this subject.
pub fn veto_has_submitter(record: &VetoRecord, submitter_hash: &str) -> bool {
    record.submitted_by.iter().any(|h| h == submitter_hash)
}

/// Returns the thresholds from the most recent settings row, or the defaults.
pub fn current_thresholds(conn: &DbConnection) -> Result<Thresholds> {
    let mut stmt = conn.prepare(
        "SELECT required_upvotes, required_downvotes FROM settings ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(Thresholds {
            required_upvotes: row.get(0)?,
            required_downvotes: row.get(1)?,
        }),
        None => Ok(Thresholds::default()),
    }
}

/// Appends a new settings row; the latest row wins.
pub fn create_settings(conn: &DbConnection, thresholds: &Thresholds) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (required_upvotes, required_downvotes, created_at) VALUES (?1, ?2, ?3)",
        &[
            &thresholds.required_upvotes as &dyn rusqlite::ToSql,
            &thresholds.required_downvotes as &dyn rusqlite::ToSql,
            &now() as &dyn rusqlite::ToSql,
        ],
    )?;
    Ok(())
}
