use axum::{Json, extract::Path};
use tracing::info;

use updoot_types::api::{VoteRequest, VoteResponse};
use updoot_types::vote::VoteValue;

use crate::context::RequestContext;
use crate::error::ApiError;

/// POST /posts/{id}/vote: cast, flip or retract the caller's vote.
///
/// The response carries the committed points and vote status so clients can
/// replace any optimistic guess with the authoritative values.
pub async fn vote(
    ctx: RequestContext,
    Path(post_id): Path<i64>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, ApiError> {
    let user_id = ctx.require_user()?;
    let value = VoteValue::try_from(req.value).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = ctx
        .blocking(move |db| db.cast_vote(user_id, post_id, value))
        .await?
        .ok_or(ApiError::NotFound("post"))?;

    info!(
        "User {} voted {:?} on post {} (status {}, points {})",
        user_id, value, post_id, outcome.vote_status, outcome.points
    );

    Ok(Json(VoteResponse {
        post_id: outcome.post_id,
        points: outcome.points,
        vote_status: outcome.vote_status,
    }))
}
