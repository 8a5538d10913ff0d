use crate::Database;
use crate::models::{POST_COLUMNS, PostRow, USER_COLUMNS, UserRow};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, info};

/// Result of inserting a user. Unique-key conflicts are expected outcomes,
/// reported to callers as values rather than errors.
#[derive(Debug)]
pub enum UserInsert {
    Created(UserRow),
    UsernameTaken,
    EmailTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostDeletion {
    Deleted,
    NotFound,
    NotOwner,
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<UserInsert> {
        let now = now.timestamp_millis();
        self.with_conn_mut(|conn| {
            let inserted = conn.query_row(
                &format!(
                    "INSERT INTO users (username, email, password, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)
                     RETURNING {USER_COLUMNS}"
                ),
                rusqlite::params![username, email, password_hash, now],
                UserRow::from_row,
            );

            match inserted {
                Ok(row) => Ok(UserInsert::Created(row)),
                Err(rusqlite::Error::SqliteFailure(err, Some(msg)))
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    debug!("User insert rejected: {}", msg);
                    if msg.contains("users.email") {
                        Ok(UserInsert::EmailTaken)
                    } else {
                        Ok(UserInsert::UsernameTaken)
                    }
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "username = ?1", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "id = ?1", id))
    }

    /// Batch-fetch users for a set of ids in one query. Row order is
    /// unspecified and unknown ids are simply absent.
    pub fn get_users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Posts --

    pub fn create_post(
        &self,
        creator_id: i64,
        title: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<PostRow> {
        let now = now.timestamp_millis();
        let row = self.with_conn_mut(|conn| {
            Ok(conn.query_row(
                &format!(
                    "INSERT INTO posts (title, text, creator_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)
                     RETURNING {POST_COLUMNS}"
                ),
                rusqlite::params![title, text, creator_id, now],
                PostRow::from_row,
            )?)
        })?;

        info!("Post {} created by user {}", row.id, creator_id);
        Ok(row)
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1"),
                [id],
                PostRow::from_row,
            )
            .optional()
        })
    }

    /// Update title and text. Ownership is part of the UPDATE predicate, so a
    /// post that is missing or owned by someone else yields `None`.
    pub fn update_post(
        &self,
        id: i64,
        creator_id: i64,
        title: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PostRow>> {
        let now = now.timestamp_millis();
        self.with_conn_mut(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE posts SET title = ?1, text = ?2, updated_at = ?3
                     WHERE id = ?4 AND creator_id = ?5
                     RETURNING {POST_COLUMNS}"
                ),
                rusqlite::params![title, text, now, id, creator_id],
                PostRow::from_row,
            )
            .optional()
        })
    }

    /// Delete a post and every vote cast on it, in one transaction.
    pub fn delete_post(&self, id: i64, creator_id: i64) -> Result<PostDeletion> {
        self.with_tx(|tx| {
            let owner: Option<i64> = tx
                .query_row("SELECT creator_id FROM posts WHERE id = ?1", [id], |row| {
                    row.get(0)
                })
                .optional()?;

            match owner {
                None => Ok(PostDeletion::NotFound),
                Some(owner) if owner != creator_id => Ok(PostDeletion::NotOwner),
                Some(_) => {
                    let votes = tx.execute("DELETE FROM votes WHERE post_id = ?1", [id])?;
                    tx.execute(
                        "DELETE FROM posts WHERE id = ?1 AND creator_id = ?2",
                        [id, creator_id],
                    )?;
                    info!("Post {} deleted along with {} votes", id, votes);
                    Ok(PostDeletion::Deleted)
                }
            }
        })
    }
}

fn query_user_where<P: rusqlite::ToSql>(
    conn: &Connection,
    predicate: &str,
    param: P,
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}"))?;
    stmt.query_row([param], UserRow::from_row).optional()
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, at};

    #[test]
    fn duplicate_username_and_email_are_reported_separately() {
        let (_dir, db) = test_support::open();
        test_support::user(&db, "ada");

        let dup_name = db.create_user("ada", "other@example.com", "h", at(2)).unwrap();
        assert!(matches!(dup_name, UserInsert::UsernameTaken));

        let dup_email = db.create_user("grace", "ada@example.com", "h", at(2)).unwrap();
        assert!(matches!(dup_email, UserInsert::EmailTaken));
    }

    #[test]
    fn batch_user_lookup_skips_unknown_ids() {
        let (_dir, db) = test_support::open();
        let ada = test_support::user(&db, "ada");
        let grace = test_support::user(&db, "grace");

        let mut names: Vec<String> = db
            .get_users_by_ids(&[grace, 999, ada])
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        names.sort();
        assert_eq!(names, vec!["ada", "grace"]);
        assert!(db.get_users_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn only_the_creator_can_update() {
        let (_dir, db) = test_support::open();
        let ada = test_support::user(&db, "ada");
        let grace = test_support::user(&db, "grace");
        let post = db.create_post(ada, "title", "text", at(10)).unwrap();

        assert!(db.update_post(post.id, grace, "hijack", "x", at(20)).unwrap().is_none());
        assert!(db.update_post(404, ada, "nothing", "x", at(20)).unwrap().is_none());

        let updated = db.update_post(post.id, ada, "new", "body", at(20)).unwrap().unwrap();
        assert_eq!(updated.title, "new");
        assert_eq!(updated.created_at, 10);
        assert_eq!(updated.updated_at, 20);
    }

    #[test]
    fn delete_checks_owner_and_existence() {
        let (_dir, db) = test_support::open();
        let ada = test_support::user(&db, "ada");
        let grace = test_support::user(&db, "grace");
        let post = db.create_post(ada, "title", "text", at(10)).unwrap();

        assert_eq!(db.delete_post(post.id, grace).unwrap(), PostDeletion::NotOwner);
        assert_eq!(db.delete_post(post.id, ada).unwrap(), PostDeletion::Deleted);
        assert_eq!(db.delete_post(post.id, ada).unwrap(), PostDeletion::NotFound);
        assert!(db.get_post(post.id).unwrap().is_none());
    }
}
