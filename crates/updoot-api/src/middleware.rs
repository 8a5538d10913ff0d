use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
    typed_header::TypedHeaderRejection,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use updoot_types::api::Claims;

use crate::error::ApiError;
use crate::state::AppState;

/// Who is making the request, if anyone.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub user_id: Option<i64>,
    pub username: Option<String>,
}

impl Session {
    fn from_claims(claims: Claims) -> Self {
        Self {
            user_id: Some(claims.sub),
            username: Some(claims.username),
        }
    }
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// Resolve the bearer token, if any, into a [`Session`] extension.
///
/// Never rejects: a missing, malformed or expired token yields an anonymous
/// session, and routes that need a user are guarded by [`require_auth`].
pub async fn resolve_session(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = match bearer {
        Ok(TypedHeader(Authorization(bearer))) => {
            match decode_token(&state.jwt_secret, bearer.token()) {
                Ok(claims) => Session::from_claims(claims),
                Err(e) => {
                    debug!("Ignoring invalid bearer token: {}", e);
                    Session::default()
                }
            }
        }
        Err(rejection) if rejection.is_missing() => Session::default(),
        Err(rejection) => {
            debug!("Ignoring malformed Authorization header: {}", rejection);
            Session::default()
        }
    };

    req.extensions_mut().insert(session);
    next.run(req).await
}

/// Reject requests without an authenticated session.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, ApiError> {
    let authenticated = req
        .extensions()
        .get::<Session>()
        .is_some_and(|s| s.user_id.is_some());

    if !authenticated {
        return Err(ApiError::NotAuthenticated);
    }
    Ok(next.run(req).await)
}
