use crate::cache::{Cache, POSTS_FIELD, PageArgs};

/// The merged feed as the cache currently knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFeed {
    /// Ids of every cached page, concatenated in fetch order.
    pub post_ids: Vec<i64>,
    pub has_more: bool,
    /// The requested page itself is missing, so the network must be asked.
    pub partial: bool,
}

/// Resolve a `posts(args)` read from the cache.
///
/// Returns `None` when no feed page has been cached at all. Otherwise every
/// cached page is merged, whatever its arguments, and `has_more` drops to
/// false as soon as any page reports the end of the feed.
pub fn resolve_feed(cache: &Cache, requested: &PageArgs) -> Option<ResolvedFeed> {
    let fields: Vec<_> = cache
        .inspect_fields()
        .into_iter()
        .filter(|f| f.field_name == POSTS_FIELD)
        .filter_map(|f| f.args)
        .collect();

    if fields.is_empty() {
        return None;
    }

    let mut post_ids = Vec::new();
    let mut has_more = true;
    for args in &fields {
        let Some(page) = cache.page(args) else {
            continue;
        };
        if !page.has_more {
            has_more = false;
        }
        post_ids.extend_from_slice(&page.post_ids);
    }

    Some(ResolvedFeed {
        post_ids,
        has_more,
        partial: !cache.page_complete(requested),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::post;
    use updoot_types::api::PaginatedPosts;

    fn page(ids: &[i64], has_more: bool) -> PaginatedPosts {
        PaginatedPosts {
            posts: ids.iter().map(|id| post(*id, 0, None)).collect(),
            has_more,
        }
    }

    #[test]
    fn empty_cache_is_a_miss() {
        let mut cache = Cache::new();
        cache.set_me(None);
        assert_eq!(resolve_feed(&cache, &PageArgs::new(Some(10), None)), None);
    }

    #[test]
    fn pages_merge_in_fetch_order() {
        let mut cache = Cache::new();
        let first = PageArgs::new(Some(2), None);
        let second = PageArgs::new(Some(2), Some("4000".into()));
        cache.write_page(first.clone(), page(&[5, 4], true));
        cache.write_page(second.clone(), page(&[3, 2], true));

        let feed = resolve_feed(&cache, &second).unwrap();
        assert_eq!(feed.post_ids, vec![5, 4, 3, 2]);
        assert!(feed.has_more);
        assert!(!feed.partial);
    }

    #[test]
    fn any_final_page_ends_the_feed() {
        let mut cache = Cache::new();
        cache.write_page(PageArgs::new(Some(2), None), page(&[3, 2], true));
        let last = PageArgs::new(Some(2), Some("2000".into()));
        cache.write_page(last.clone(), page(&[1], false));

        assert!(!resolve_feed(&cache, &last).unwrap().has_more);
    }

    #[test]
    fn an_early_final_page_wins_over_later_ones() {
        let mut cache = Cache::new();
        let short = PageArgs::new(Some(5), None);
        cache.write_page(short.clone(), page(&[3, 2, 1], false));
        let later = PageArgs::new(Some(2), Some("9000".into()));
        cache.write_page(later.clone(), page(&[8, 7], true));

        let feed = resolve_feed(&cache, &later).unwrap();
        assert!(!feed.has_more);
        assert_eq!(feed.post_ids, vec![3, 2, 1, 8, 7]);
        assert!(!feed.partial);
    }

    #[test]
    fn uncached_page_is_partial() {
        let mut cache = Cache::new();
        cache.write_page(PageArgs::new(Some(2), None), page(&[5, 4], true));

        let next = PageArgs::new(Some(2), Some("4000".into()));
        let feed = resolve_feed(&cache, &next).unwrap();
        assert!(feed.partial);
        assert_eq!(feed.post_ids, vec![5, 4]);
    }

    #[test]
    fn page_with_evicted_entities_still_resolves() {
        let mut cache = Cache::new();
        let args = PageArgs::new(Some(2), None);
        cache.write_page(args.clone(), page(&[5, 4], true));
        cache.evict_post(4);

        let feed = resolve_feed(&cache, &args).unwrap();
        assert_eq!(feed.post_ids, vec![5]);
        assert!(!feed.partial);
    }

    #[test]
    fn invalidation_clears_every_page() {
        let mut cache = Cache::new();
        cache.write_page(PageArgs::new(Some(2), None), page(&[5, 4], true));
        cache.write_page(PageArgs::new(Some(15), None), page(&[5, 4, 3], false));
        cache.set_me(None);

        assert_eq!(cache.invalidate_pages(), 2);
        assert_eq!(resolve_feed(&cache, &PageArgs::new(Some(2), None)), None);
        assert_eq!(cache.me(), Some(None));
    }
}
