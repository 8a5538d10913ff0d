use std::collections::HashMap;

use updoot_types::models::Creator;

use crate::loader::{BatchFn, BatchLoader};
use crate::state::AppState;

/// Post creators by user id.
pub struct UserBatch {
    state: AppState,
}

impl BatchFn for UserBatch {
    type Key = i64;
    type Value = Creator;

    async fn load_many(&self, keys: Vec<i64>) -> anyhow::Result<Vec<Option<Creator>>> {
        let state = self.state.clone();
        let ids = keys.clone();
        let rows = tokio::task::spawn_blocking(move || state.db.get_users_by_ids(&ids)).await??;

        let by_id: HashMap<i64, Creator> = rows
            .into_iter()
            .map(|row| {
                (
                    row.id,
                    Creator {
                        id: row.id,
                        username: row.username,
                    },
                )
            })
            .collect();

        Ok(keys.iter().map(|id| by_id.get(id).cloned()).collect())
    }
}

/// Stored vote values by (user_id, post_id).
pub struct VoteBatch {
    state: AppState,
}

impl BatchFn for VoteBatch {
    type Key = (i64, i64);
    type Value = i32;

    async fn load_many(&self, keys: Vec<(i64, i64)>) -> anyhow::Result<Vec<Option<i32>>> {
        let state = self.state.clone();
        let pairs = keys.clone();
        let rows = tokio::task::spawn_blocking(move || state.db.get_votes(&pairs)).await??;

        let by_pair: HashMap<(i64, i64), i32> = rows
            .into_iter()
            .map(|row| ((row.user_id, row.post_id), row.value))
            .collect();

        Ok(keys.iter().map(|pair| by_pair.get(pair).copied()).collect())
    }
}

/// The loaders available to one request.
pub struct Loaders {
    pub users: BatchLoader<UserBatch>,
    pub votes: BatchLoader<VoteBatch>,
}

impl Loaders {
    pub fn new(state: &AppState) -> Self {
        Self {
            users: BatchLoader::new(UserBatch {
                state: state.clone(),
            }),
            votes: BatchLoader::new(VoteBatch {
                state: state.clone(),
            }),
        }
    }
}
