//! The vote ledger and the transaction that keeps `posts.points` equal to the
//! sum of its votes.

use crate::Database;
use crate::models::{VoteOutcome, VoteRow};
use crate::queries::OptionalExt;
use anyhow::Result;
use tracing::debug;
use updoot_types::vote::{LedgerAction, VoteTransition, VoteValue};

impl Database {
    /// Apply a user's vote to a post.
    ///
    /// The existing vote is read, the ledger row written and the post's points
    /// adjusted inside one immediate transaction, so concurrent votes on the
    /// same pair serialize instead of losing updates. Returns `None` when the
    /// post does not exist; nothing is written in that case.
    pub fn cast_vote(&self, user_id: i64, post_id: i64, value: VoteValue) -> Result<Option<VoteOutcome>> {
        self.with_tx(|tx| {
            let exists = tx
                .query_row("SELECT 1 FROM posts WHERE id = ?1", [post_id], |_| Ok(()))
                .optional()?
                .is_some();
            if !exists {
                return Ok(None);
            }

            let previous: Option<i32> = tx
                .query_row(
                    "SELECT value FROM votes WHERE user_id = ?1 AND post_id = ?2",
                    [user_id, post_id],
                    |row| row.get(0),
                )
                .optional()?;

            let transition = VoteTransition::resolve(previous, value);

            match transition.action {
                LedgerAction::Insert => {
                    tx.execute(
                        "INSERT INTO votes (user_id, post_id, value) VALUES (?1, ?2, ?3)",
                        rusqlite::params![user_id, post_id, transition.stored],
                    )?;
                }
                LedgerAction::Retract | LedgerAction::Change => {
                    tx.execute(
                        "UPDATE votes SET value = ?1 WHERE user_id = ?2 AND post_id = ?3",
                        rusqlite::params![transition.stored, user_id, post_id],
                    )?;
                }
            }

            let points: i32 = tx.query_row(
                "UPDATE posts SET points = points + ?1 WHERE id = ?2 RETURNING points",
                rusqlite::params![transition.delta, post_id],
                |row| row.get(0),
            )?;

            debug!(
                "Vote by user {} on post {}: {:?} -> {} ({:+}), points now {}",
                user_id, post_id, previous, transition.stored, transition.delta, points
            );

            Ok(Some(VoteOutcome {
                post_id,
                points,
                vote_status: transition.stored,
            }))
        })
    }

    pub fn get_vote(&self, user_id: i64, post_id: i64) -> Result<Option<i32>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM votes WHERE user_id = ?1 AND post_id = ?2",
                [user_id, post_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Batch-fetch ledger rows for a set of (user_id, post_id) pairs in one
    /// query. Pairs without a row are absent from the result.
    pub fn get_votes(&self, keys: &[(i64, i64)]) -> Result<Vec<VoteRow>> {
        if keys.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let tuples: Vec<String> = (0..keys.len())
                .map(|i| format!("(?{}, ?{})", 2 * i + 1, 2 * i + 2))
                .collect();
            let sql = format!(
                "SELECT user_id, post_id, value FROM votes
                 WHERE (user_id, post_id) IN (VALUES {})",
                tuples.join(", ")
            );

            let params = keys.iter().flat_map(|(user_id, post_id)| [*user_id, *post_id]);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(VoteRow {
                        user_id: row.get(0)?,
                        post_id: row.get(1)?,
                        value: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
