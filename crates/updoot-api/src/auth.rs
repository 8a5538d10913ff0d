use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::Json;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use updoot_db::models::{UserRow, datetime_from_millis};
use updoot_db::queries::UserInsert;
use updoot_types::api::{Claims, FieldError, LoginRequest, RegisterRequest, UserResponse};
use updoot_types::models::User;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::validation::validate_register;

pub async fn register(
    ctx: RequestContext,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(errors) = validate_register(&req) {
        return Ok(Json(UserResponse::errors(errors)));
    }

    let now = chrono::Utc::now();
    let inserted = ctx
        .blocking(move |db| {
            // Hash password with Argon2id
            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(req.password.as_bytes(), &salt)
                .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
                .to_string();

            db.create_user(&req.username, &req.email, &password_hash, now)
        })
        .await?;

    let user = match inserted {
        UserInsert::Created(user) => user,
        UserInsert::UsernameTaken => {
            return Ok(Json(UserResponse::errors(vec![FieldError::new(
                "username",
                "username is already taken",
            )])));
        }
        UserInsert::EmailTaken => {
            return Ok(Json(UserResponse::errors(vec![FieldError::new(
                "email",
                "email is already taken",
            )])));
        }
    };

    info!("Registered user {} ({})", user.id, user.username);
    signed_in(&ctx, user)
}

pub async fn login(
    ctx: RequestContext,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let lookup = req.username_or_email.clone();
    let user = ctx
        .blocking(move |db| {
            if lookup.contains('@') {
                db.get_user_by_email(&lookup)
            } else {
                db.get_user_by_username(&lookup)
            }
        })
        .await?;

    let Some(user) = user else {
        return Ok(Json(UserResponse::errors(vec![FieldError::new(
            "usernameOrEmail",
            "that username doesn't exist",
        )])));
    };

    let stored = user.password.clone();
    let valid = ctx
        .blocking(move |_| {
            let parsed = PasswordHash::new(&stored)
                .map_err(|e| anyhow::anyhow!("stored password hash is corrupt: {}", e))?;
            Ok(Argon2::default()
                .verify_password(req.password.as_bytes(), &parsed)
                .is_ok())
        })
        .await?;

    if !valid {
        return Ok(Json(UserResponse::errors(vec![FieldError::new(
            "password",
            "incorrect password",
        )])));
    }

    signed_in(&ctx, user)
}

/// The current user, or `null` for anonymous callers.
pub async fn me(ctx: RequestContext) -> Result<Json<Option<User>>, ApiError> {
    let Some(user_id) = ctx.viewer() else {
        return Ok(Json(None));
    };

    let user = ctx.blocking(move |db| db.get_user_by_id(user_id)).await?;
    Ok(Json(user.map(user_view)))
}

pub fn issue_token(secret: &str, user_id: i64, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn user_view(row: UserRow) -> User {
    User {
        id: row.id,
        username: row.username,
        email: row.email,
        created_at: datetime_from_millis(row.created_at),
        updated_at: datetime_from_millis(row.updated_at),
    }
}

fn signed_in(ctx: &RequestContext, user: UserRow) -> Result<Json<UserResponse>, ApiError> {
    let token = issue_token(&ctx.state.jwt_secret, user.id, &user.username)?;
    Ok(Json(UserResponse {
        errors: None,
        user: Some(user_view(user)),
        token: Some(token),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::decode_token;

    #[test]
    fn issued_tokens_decode_with_the_same_secret_only() {
        let token = issue_token("s3cret", 42, "ada").unwrap();

        let claims = decode_token("s3cret", &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.username, "ada");

        assert!(decode_token("other", &token).is_err());
    }
}
