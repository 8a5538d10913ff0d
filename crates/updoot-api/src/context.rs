use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::error;

use updoot_db::Database;

use crate::error::ApiError;
use crate::loaders::Loaders;
use crate::middleware::Session;
use crate::state::AppState;

/// Everything a handler may touch, assembled once per request: the store
/// handle, the caller's session, and loaders scoped to this request.
pub struct RequestContext {
    pub state: AppState,
    pub session: Session,
    pub loaders: Loaders,
}

impl RequestContext {
    pub fn new(state: AppState, session: Session) -> Self {
        let loaders = Loaders::new(&state);
        Self {
            state,
            session,
            loaders,
        }
    }

    pub fn viewer(&self) -> Option<i64> {
        self.session.user_id
    }

    pub fn require_user(&self) -> Result<i64, ApiError> {
        self.session.user_id.ok_or(ApiError::NotAuthenticated)
    }

    /// Run blocking store work off the async runtime.
    pub async fn blocking<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(ApiError::from)
    }
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = parts.extensions.get::<Session>().cloned().unwrap_or_default();
        Ok(Self::new(state.clone(), session))
    }
}
