/// Database row types, mapping directly to SQLite rows.
/// Distinct from updoot-types API models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub points: i32,
    pub creator_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteRow {
    pub user_id: i64,
    pub post_id: i64,
    pub value: i32,
}

/// Post state committed by a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub post_id: i64,
    pub points: i32,
    pub vote_status: i32,
}

/// Timestamps are stored as epoch milliseconds.
pub fn datetime_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(|| {
        warn!("Corrupt timestamp {} in database", ms);
        DateTime::default()
    })
}

pub(crate) const USER_COLUMNS: &str = "id, username, email, password, created_at, updated_at";
pub(crate) const POST_COLUMNS: &str = "id, title, text, points, creator_id, created_at, updated_at";

impl UserRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl PostRow {
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            text: row.get(2)?,
            points: row.get(3)?,
            creator_id: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}
