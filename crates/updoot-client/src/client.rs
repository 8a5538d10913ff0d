use std::sync::{Mutex, MutexGuard};

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use updoot_types::api::{
    ErrorBody, ErrorKind, LoginRequest, PaginatedPosts, PostInput, PostsQuery, RegisterRequest,
    UserResponse, VoteRequest, VoteResponse,
};
use updoot_types::models::{PostView, User};
use updoot_types::timestamp::to_millis_string;
use updoot_types::vote::VoteValue;

use crate::cache::{Cache, PageArgs};
use crate::error::ClientError;
use crate::optimistic::OptimisticVotes;
use crate::pagination::{ResolvedFeed, resolve_feed};

/// A flattened feed: every cached page merged, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feed {
    pub posts: Vec<PostView>,
    pub has_more: bool,
}

impl Feed {
    /// Cursor for the page after the last post shown.
    pub fn next_cursor(&self) -> Option<String> {
        self.posts.last().map(|p| to_millis_string(&p.created_at))
    }
}

#[derive(Default)]
struct ClientState {
    cache: Cache,
    votes: OptimisticVotes,
    token: Option<String>,
}

/// HTTP client with a normalized cache in front of the feed and votes.
///
/// The cache lock is never held across a request.
pub struct UpdootClient {
    http: reqwest::Client,
    base_url: String,
    state: Mutex<ClientState>,
}

impl UpdootClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            state: Mutex::new(ClientState::default()),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.state().token.is_some()
    }

    pub fn cached_post(&self, id: i64) -> Option<PostView> {
        self.state().cache.post(id).cloned()
    }

    /// Read `posts(limit, cursor)`, from the cache when the page is there.
    pub async fn posts(&self, limit: Option<i64>, cursor: Option<String>) -> Result<Feed, ClientError> {
        let args = PageArgs::new(limit, cursor);
        {
            let state = self.state();
            match resolve_feed(&state.cache, &args) {
                Some(resolved) if !resolved.partial => return Ok(flatten(&state.cache, resolved)),
                _ => {}
            }
        }

        self.refetch_posts(args).await
    }

    /// Fetch a page from the server and merge it, even if it is cached.
    pub async fn refetch_posts(&self, args: PageArgs) -> Result<Feed, ClientError> {
        let query = PostsQuery {
            limit: args.limit,
            cursor: args.cursor.clone(),
        };
        let page: PaginatedPosts = self
            .send(self.http.get(self.url("/posts")).query(&query))
            .await?;
        debug!("Fetched {} with {} posts", args.field_key(), page.posts.len());

        let mut state = self.state();
        state.cache.write_page(args.clone(), page);
        Ok(match resolve_feed(&state.cache, &args) {
            Some(resolved) => flatten(&state.cache, resolved),
            None => Feed::default(),
        })
    }

    pub async fn post(&self, id: i64) -> Result<Option<PostView>, ClientError> {
        let post: Option<PostView> = self
            .send(self.http.get(self.url(&format!("/posts/{id}"))))
            .await?;
        if let Some(post) = &post {
            self.state().cache.write_post(post.clone());
        }
        Ok(post)
    }

    /// Vote with an optimistic cache write, reconciled once the server
    /// answers. Failures are reverted and never retried.
    pub async fn vote(&self, post_id: i64, value: VoteValue) -> Result<VoteResponse, ClientError> {
        let ticket = {
            let mut state = self.state();
            let ClientState { cache, votes, .. } = &mut *state;
            votes.apply(cache, post_id, value)
        };

        let result: Result<VoteResponse, ClientError> = self
            .send(
                self.http
                    .post(self.url(&format!("/posts/{post_id}/vote")))
                    .json(&VoteRequest {
                        value: value.as_i32(),
                    }),
            )
            .await;

        let mut state = self.state();
        let ClientState { cache, votes, .. } = &mut *state;
        match (&result, ticket) {
            (Ok(res), Some(ticket)) => votes.confirm(cache, ticket, *res),
            (Ok(res), None) => {
                cache.write_vote(post_id, res.points, Some(res.vote_status));
            }
            (Err(_), Some(ticket)) => votes.rollback(cache, ticket),
            (Err(_), None) => {}
        }

        if let Err(e) = &result {
            warn!("Vote on post {} failed: {}", post_id, e);
        }
        result
    }

    /// Create a post. Every cached feed page is dropped, since the new post
    /// belongs at the top of the feed.
    pub async fn create_post(&self, title: &str, text: &str) -> Result<PostView, ClientError> {
        let post: PostView = self
            .send(self.http.post(self.url("/posts")).json(&post_input(title, text)))
            .await?;

        let mut state = self.state();
        state.cache.invalidate_pages();
        state.cache.write_post(post.clone());
        Ok(post)
    }

    pub async fn update_post(&self, id: i64, title: &str, text: &str) -> Result<Option<PostView>, ClientError> {
        let post: Option<PostView> = self
            .send(
                self.http
                    .put(self.url(&format!("/posts/{id}")))
                    .json(&post_input(title, text)),
            )
            .await?;
        if let Some(post) = &post {
            self.state().cache.write_post(post.clone());
        }
        Ok(post)
    }

    pub async fn delete_post(&self, id: i64) -> Result<bool, ClientError> {
        let deleted: bool = self
            .send(self.http.delete(self.url(&format!("/posts/{id}"))))
            .await?;
        if deleted {
            self.state().cache.evict_post(id);
        }
        Ok(deleted)
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<UserResponse, ClientError> {
        let req = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let res: UserResponse = self
            .send(self.http.post(self.url("/auth/register")).json(&req))
            .await?;
        self.signed_in(&res);
        Ok(res)
    }

    pub async fn login(&self, username_or_email: &str, password: &str) -> Result<UserResponse, ClientError> {
        let req = LoginRequest {
            username_or_email: username_or_email.to_string(),
            password: password.to_string(),
        };
        let res: UserResponse = self
            .send(self.http.post(self.url("/auth/login")).json(&req))
            .await?;
        self.signed_in(&res);
        Ok(res)
    }

    /// Forget the session. Cached pages carry the old viewer's vote status,
    /// so they go too.
    pub fn logout(&self) {
        let mut state = self.state();
        state.token = None;
        state.cache.set_me(None);
        state.cache.invalidate_pages();
    }

    pub async fn me(&self) -> Result<Option<User>, ClientError> {
        if let Some(me) = self.state().cache.me() {
            return Ok(me.cloned());
        }

        let me: Option<User> = self.send(self.http.get(self.url("/auth/me"))).await?;
        self.state().cache.set_me(me.clone());
        Ok(me)
    }

    /// Adopt a new session. Cached pages were read as someone else, so
    /// their vote statuses are dropped with them.
    fn signed_in(&self, res: &UserResponse) {
        if let (Some(user), Some(token)) = (&res.user, &res.token) {
            let mut state = self.state();
            state.token = Some(token.clone());
            state.cache.set_me(Some(user.clone()));
            state.cache.invalidate_pages();
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        // The cache stays consistent between statements, so a panic
        // elsewhere does not make it unusable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let token = self.state().token.clone();
        let req = match token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let err = api_error(status, &bytes);
            if err.requires_login() {
                debug!("Server asked for a login");
            }
            return Err(err);
        }

        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn flatten(cache: &Cache, resolved: ResolvedFeed) -> Feed {
    Feed {
        posts: resolved
            .post_ids
            .iter()
            .filter_map(|id| cache.post(*id).cloned())
            .collect(),
        has_more: resolved.has_more,
    }
}

fn post_input(title: &str, text: &str) -> PostInput {
    PostInput {
        title: title.to_string(),
        text: text.to_string(),
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(body) => ClientError::Api {
            status: status.as_u16(),
            kind: body.error.kind,
            message: body.error.message,
        },
        // Body rejections from the framework are plain text.
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            kind: if status.is_server_error() {
                ErrorKind::Internal
            } else {
                ErrorKind::BadRequest
            },
            message: String::from_utf8_lossy(body).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_errors_keep_their_kind() {
        let body = br#"{"error":{"kind":"not_authenticated","message":"not authenticated"}}"#;
        let err = api_error(StatusCode::UNAUTHORIZED, body);
        assert!(err.requires_login());
    }

    #[test]
    fn plain_text_errors_are_classified_by_status() {
        let err = api_error(StatusCode::UNPROCESSABLE_ENTITY, b"missing field `title`");
        assert_eq!(err.kind(), Some(ErrorKind::BadRequest));
        let err = api_error(StatusCode::BAD_GATEWAY, b"");
        assert_eq!(err.kind(), Some(ErrorKind::Internal));
    }

    #[test]
    fn next_cursor_is_the_last_created_at() {
        let feed = Feed {
            posts: vec![
                crate::cache::test_support::post(3, 0, None),
                crate::cache::test_support::post(2, 0, None),
            ],
            has_more: true,
        };
        assert_eq!(feed.next_cursor().as_deref(), Some("2000"));
    }
}
