use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp::millis_string;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(with = "millis_string")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "millis_string")]
    pub updated_at: DateTime<Utc>,
}

/// Public face of a post's author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: i64,
    pub username: String,
}

/// A post as seen by one viewer.
///
/// `vote_status` is `None` when the viewer is anonymous or never voted on
/// the post, and `Some(0)` when they voted and then retracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub text_snippet: String,
    pub points: i32,
    pub vote_status: Option<i32>,
    pub creator_id: i64,
    pub creator: Creator,
    #[serde(with = "millis_string")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "millis_string")]
    pub updated_at: DateTime<Utc>,
}

/// Characters of post text shown in feed listings.
pub const SNIPPET_CHARS: usize = 50;

pub fn text_snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}
