//! Cursor-paginated reads over posts, newest first.

use crate::Database;
use crate::models::{POST_COLUMNS, PostRow};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 50;

/// A validated page request: `limit` within `1..=MAX_PAGE_SIZE`, and an
/// exclusive upper bound on `created_at` when continuing a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub cursor: Option<DateTime<Utc>>,
}

impl PageRequest {
    /// Out-of-range limits are clamped rather than rejected.
    pub fn new(limit: Option<i64>, cursor: Option<DateTime<Utc>>) -> Self {
        let limit = match limit {
            None => DEFAULT_PAGE_SIZE,
            Some(n) => n.clamp(1, MAX_PAGE_SIZE as i64) as usize,
        };
        Self { limit, cursor }
    }
}

#[derive(Debug)]
pub struct FeedPage {
    pub rows: Vec<PostRow>,
    pub has_more: bool,
}

impl Database {
    /// Fetch one page of posts ordered by `created_at` descending.
    ///
    /// One extra row is requested to learn whether anything lies beyond the
    /// page; it is never returned. Rows sharing the cursor's timestamp are
    /// excluded, so a page boundary never repeats a post.
    pub fn fetch_posts_page(&self, page: PageRequest) -> Result<FeedPage> {
        let fetch = (page.limit + 1) as i64;
        let cursor = page.cursor.map(|c| c.timestamp_millis());

        let mut rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE ?1 IS NULL OR created_at < ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![cursor, fetch], PostRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let has_more = rows.len() == page.limit + 1;
        rows.truncate(page.limit);

        Ok(FeedPage { rows, has_more })
    }
}
