use axum::{
    Json,
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::future::{try_join, try_join_all};
use tracing::info;

use updoot_db::feed::PageRequest;
use updoot_db::models::{PostRow, datetime_from_millis};
use updoot_db::queries::PostDeletion;
use updoot_types::api::{PaginatedPosts, PostInput, PostsQuery};
use updoot_types::models::{Creator, PostView, text_snippet};
use updoot_types::timestamp::parse_millis;

use crate::context::RequestContext;
use crate::error::ApiError;

/// GET /posts: newest first, `limit` clamped to 50, `cursor` exclusive.
pub async fn list_posts(
    ctx: RequestContext,
    Query(query): Query<PostsQuery>,
) -> Result<Json<PaginatedPosts>, ApiError> {
    let cursor = query
        .cursor
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(parse_millis)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let page = PageRequest::new(query.limit, cursor);
    let feed = ctx.blocking(move |db| db.fetch_posts_page(page)).await?;
    let posts = post_views(&ctx, feed.rows).await?;

    Ok(Json(PaginatedPosts {
        posts,
        has_more: feed.has_more,
    }))
}

pub async fn get_post(
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<Option<PostView>>, ApiError> {
    let Some(row) = ctx.blocking(move |db| db.get_post(id)).await? else {
        return Ok(Json(None));
    };

    Ok(Json(post_views(&ctx, vec![row]).await?.pop()))
}

pub async fn create_post(
    ctx: RequestContext,
    Json(input): Json<PostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let creator_id = ctx.require_user()?;
    let input = checked(input)?;

    let now = chrono::Utc::now();
    let row = ctx
        .blocking(move |db| db.create_post(creator_id, &input.title, &input.text, now))
        .await?;

    let view = post_views(&ctx, vec![row])
        .await?
        .pop()
        .ok_or_else(|| anyhow::anyhow!("created post vanished before it could be read"))?;

    Ok((StatusCode::CREATED, Json(view)))
}

/// PUT /posts/{id}: `null` unless the caller created the post.
pub async fn update_post(
    ctx: RequestContext,
    Path(id): Path<i64>,
    Json(input): Json<PostInput>,
) -> Result<Json<Option<PostView>>, ApiError> {
    let creator_id = ctx.require_user()?;
    let input = checked(input)?;

    let now = chrono::Utc::now();
    let updated = ctx
        .blocking(move |db| db.update_post(id, creator_id, &input.title, &input.text, now))
        .await?;

    match updated {
        Some(row) => Ok(Json(post_views(&ctx, vec![row]).await?.pop())),
        None => Ok(Json(None)),
    }
}

pub async fn delete_post(
    ctx: RequestContext,
    Path(id): Path<i64>,
) -> Result<Json<bool>, ApiError> {
    let creator_id = ctx.require_user()?;

    match ctx.blocking(move |db| db.delete_post(id, creator_id)).await? {
        PostDeletion::Deleted => {
            info!("User {} deleted post {}", creator_id, id);
            Ok(Json(true))
        }
        PostDeletion::NotFound => Err(ApiError::NotFound("post")),
        PostDeletion::NotOwner => Err(ApiError::Forbidden),
    }
}

fn checked(input: PostInput) -> Result<PostInput, ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    Ok(input)
}

/// Attach creator and the viewer's vote status to each row.
///
/// Lookups go through the request's loaders, so a page costs one user query
/// and (for signed-in viewers) one vote query, whatever its length.
pub async fn post_views(ctx: &RequestContext, rows: Vec<PostRow>) -> Result<Vec<PostView>, ApiError> {
    let viewer = ctx.viewer();

    let creators = try_join_all(rows.iter().map(|row| ctx.loaders.users.load(row.creator_id)));
    let statuses = try_join_all(rows.iter().map(|row| async move {
        match viewer {
            Some(viewer) => ctx.loaders.votes.load((viewer, row.id)).await,
            None => Ok(None),
        }
    }));

    let (creators, statuses) = try_join(creators, statuses).await?;

    rows.into_iter()
        .zip(creators)
        .zip(statuses)
        .map(|((row, creator), vote_status)| -> Result<PostView, ApiError> {
            let creator = creator.ok_or_else(|| {
                anyhow::anyhow!("post {} references missing user {}", row.id, row.creator_id)
            })?;
            Ok(post_view(row, creator, vote_status))
        })
        .collect()
}

fn post_view(row: PostRow, creator: Creator, vote_status: Option<i32>) -> PostView {
    PostView {
        id: row.id,
        text_snippet: text_snippet(&row.text),
        title: row.title,
        text: row.text,
        points: row.points,
        vote_status,
        creator_id: row.creator_id,
        creator,
        created_at: datetime_from_millis(row.created_at),
        updated_at: datetime_from_millis(row.updated_at),
    }
}
