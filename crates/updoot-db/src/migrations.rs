use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })?;

    if version < 1 {
        info!("Running migration v1 (users, posts, votes)");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE posts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                text        TEXT NOT NULL,
                points      INTEGER NOT NULL DEFAULT 0,
                creator_id  INTEGER NOT NULL REFERENCES users(id),
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_posts_created ON posts(created_at DESC, id DESC);

            -- One row per (user, post). A retracted vote stays as value 0.
            CREATE TABLE votes (
                user_id     INTEGER NOT NULL REFERENCES users(id),
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                value       INTEGER NOT NULL CHECK (value IN (-1, 0, 1)),
                PRIMARY KEY (user_id, post_id)
            ) WITHOUT ROWID;

            CREATE INDEX idx_votes_post ON votes(post_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}
