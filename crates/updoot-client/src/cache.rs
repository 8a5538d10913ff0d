//! Normalized client cache.
//!
//! Post entities are stored once by id. Feed pages are root fields keyed by
//! their arguments and hold only ids, so a vote written to an entity shows up
//! in every page that lists it.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::debug;

use updoot_types::api::PaginatedPosts;
use updoot_types::models::{PostView, User};

pub const POSTS_FIELD: &str = "posts";
pub const ME_FIELD: &str = "me";

/// Arguments of one `posts` query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PageArgs {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

impl PageArgs {
    pub fn new(limit: Option<i64>, cursor: Option<String>) -> Self {
        Self { limit, cursor }
    }

    /// Stable key such as `posts({"cursor":"1700","limit":10})`. Arguments
    /// are sorted by name and absent ones are left out.
    pub fn field_key(&self) -> String {
        let mut args = Map::new();
        if let Some(cursor) = &self.cursor {
            args.insert("cursor".into(), Value::String(cursor.clone()));
        }
        if let Some(limit) = self.limit {
            args.insert("limit".into(), Value::from(limit));
        }
        format!("{}({})", POSTS_FIELD, Value::Object(args))
    }
}

/// A root field present in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub field_name: &'static str,
    pub field_key: String,
    /// Set for `posts` fields only.
    pub args: Option<PageArgs>,
}

/// One fetched feed page, by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub post_ids: Vec<i64>,
    pub has_more: bool,
}

#[derive(Debug, Default)]
pub struct Cache {
    posts: HashMap<i64, PostView>,
    /// Pages in the order they were first fetched.
    pages: Vec<(PageArgs, PageRecord)>,
    /// `None` until `me` has been resolved once; `Some(None)` is anonymous.
    me: Option<Option<User>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inspect_fields(&self) -> Vec<FieldInfo> {
        let mut fields: Vec<FieldInfo> = self
            .pages
            .iter()
            .map(|(args, _)| FieldInfo {
                field_name: POSTS_FIELD,
                field_key: args.field_key(),
                args: Some(args.clone()),
            })
            .collect();

        if self.me.is_some() {
            fields.push(FieldInfo {
                field_name: ME_FIELD,
                field_key: ME_FIELD.to_string(),
                args: None,
            });
        }
        fields
    }

    pub fn page(&self, args: &PageArgs) -> Option<&PageRecord> {
        self.pages.iter().find(|(a, _)| a == args).map(|(_, page)| page)
    }

    /// True when the page is cached and every post it lists is too.
    pub fn page_complete(&self, args: &PageArgs) -> bool {
        self.page(args)
            .is_some_and(|page| page.post_ids.iter().all(|id| self.posts.contains_key(id)))
    }

    /// Store a fetched page. A refetch replaces the old record in place.
    pub fn write_page(&mut self, args: PageArgs, page: PaginatedPosts) {
        let record = PageRecord {
            post_ids: page.posts.iter().map(|p| p.id).collect(),
            has_more: page.has_more,
        };
        for post in page.posts {
            self.posts.insert(post.id, post);
        }

        match self.pages.iter_mut().find(|(a, _)| *a == args) {
            Some((_, existing)) => *existing = record,
            None => self.pages.push((args, record)),
        }
    }

    pub fn post(&self, id: i64) -> Option<&PostView> {
        self.posts.get(&id)
    }

    pub fn write_post(&mut self, post: PostView) {
        self.posts.insert(post.id, post);
    }

    /// Overwrite a cached post's score fields. Returns false if the post is
    /// not cached.
    pub fn write_vote(&mut self, post_id: i64, points: i32, vote_status: Option<i32>) -> bool {
        match self.posts.get_mut(&post_id) {
            Some(post) => {
                post.points = points;
                post.vote_status = vote_status;
                true
            }
            None => false,
        }
    }

    /// Drop every cached `posts` page, whatever its arguments.
    pub fn invalidate_pages(&mut self) -> usize {
        let dropped = self.pages.len();
        self.pages.clear();
        debug!("Invalidated {} cached feed pages", dropped);
        dropped
    }

    /// Remove a post entity and every page reference to it.
    pub fn evict_post(&mut self, id: i64) {
        self.posts.remove(&id);
        for (_, page) in &mut self.pages {
            page.post_ids.retain(|p| *p != id);
        }
    }

    /// Cached `me`: outer `None` when it has never been resolved.
    pub fn me(&self) -> Option<Option<&User>> {
        self.me.as_ref().map(Option::as_ref)
    }

    pub fn set_me(&mut self, user: Option<User>) {
        self.me = Some(user);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::DateTime;
    use updoot_types::models::{Creator, PostView};

    pub fn post(id: i64, points: i32, vote_status: Option<i32>) -> PostView {
        let at = DateTime::from_timestamp_millis(id * 1_000).unwrap_or_default();
        PostView {
            id,
            title: format!("post {id}"),
            text: String::new(),
            text_snippet: String::new(),
            points,
            vote_status,
            creator_id: 1,
            creator: Creator {
                id: 1,
                username: "ada".into(),
            },
            created_at: at,
            updated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::post;
    use super::*;

    fn page(ids: &[i64], has_more: bool) -> PaginatedPosts {
        PaginatedPosts {
            posts: ids.iter().map(|id| post(*id, 0, None)).collect(),
            has_more,
        }
    }

    #[test]
    fn field_keys_sort_arguments_and_skip_missing_ones() {
        assert_eq!(PageArgs::new(Some(10), None).field_key(), r#"posts({"limit":10})"#);
        assert_eq!(
            PageArgs::new(Some(10), Some("1700".into())).field_key(),
            r#"posts({"cursor":"1700","limit":10})"#
        );
    }

    #[test]
    fn refetch_replaces_a_page_in_place() {
        let mut cache = Cache::new();
        let first = PageArgs::new(Some(2), None);
        let second = PageArgs::new(Some(2), Some("3000".into()));
        cache.write_page(first.clone(), page(&[5, 4], true));
        cache.write_page(second.clone(), page(&[3, 2], true));
        cache.write_page(first.clone(), page(&[6, 5], true));

        let keys: Vec<_> = cache.inspect_fields().into_iter().map(|f| f.args).collect();
        assert_eq!(keys, vec![Some(first.clone()), Some(second)]);
        assert_eq!(cache.page(&first).unwrap().post_ids, vec![6, 5]);
    }

    #[test]
    fn evicting_a_post_removes_it_from_pages() {
        let mut cache = Cache::new();
        let args = PageArgs::new(Some(3), None);
        cache.write_page(args.clone(), page(&[3, 2, 1], false));

        cache.evict_post(2);
        assert!(cache.post(2).is_none());
        assert_eq!(cache.page(&args).unwrap().post_ids, vec![3, 1]);
        assert!(cache.page_complete(&args));
    }

    #[test]
    fn me_is_a_root_field_once_known() {
        let mut cache = Cache::new();
        assert!(cache.me().is_none());
        assert!(cache.inspect_fields().is_empty());

        cache.set_me(None);
        assert_eq!(cache.me(), Some(None));
        assert_eq!(cache.inspect_fields()[0].field_name, ME_FIELD);
    }
}
