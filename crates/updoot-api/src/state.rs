use std::sync::Arc;

use updoot_db::Database;

/// Process-wide handles, built once at startup and handed to every request.
pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(db: Database, jwt_secret: String) -> AppState {
        Arc::new(Self { db, jwt_secret })
    }
}
