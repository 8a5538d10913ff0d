use serde::{Deserialize, Serialize};

use crate::models::{PostView, User};

// -- JWT Claims --

/// JWT claims shared by the API's session layer and the client, which only
/// ever treats the token as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Validation or conflict problem tied to one input field, rendered inline
/// by clients rather than treated as a request failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result of register/login: either field errors, or the user and a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl UserResponse {
    pub fn errors(errors: Vec<FieldError>) -> Self {
        Self {
            errors: Some(errors),
            ..Self::default()
        }
    }
}

// -- Posts --

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostsQuery {
    pub limit: Option<i64>,
    /// Stringified millisecond `createdAt` of the last post already seen.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedPosts {
    pub posts: Vec<PostView>,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostInput {
    pub title: String,
    pub text: String,
}

// -- Votes --

/// Raw value so that out-of-range votes surface as a structured
/// `bad_request` instead of a body-parsing rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub value: i32,
}

/// Authoritative state of a post right after a vote commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResponse {
    pub post_id: i64,
    pub points: i32,
    pub vote_status: i32,
}

// -- Errors --

/// Machine-readable failure category. Clients branch on this, never on the
/// message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotAuthenticated,
    Forbidden,
    NotFound,
    BadRequest,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
