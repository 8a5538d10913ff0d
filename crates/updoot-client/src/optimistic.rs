//! Optimistic vote writes and their reconciliation.
//!
//! Every click writes a predicted score into the cache before the request is
//! sent and is recorded as a pending entry for its post. When the request
//! resolves, the entry is reconciled against whatever is pending *now*, so
//! rapid clicks whose responses arrive in any order settle on the server's
//! last word.

use std::collections::HashMap;

use tracing::debug;

use updoot_types::api::VoteResponse;
use updoot_types::vote::{VoteTransition, VoteValue};

use crate::cache::Cache;

/// Score fields of a cached post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteSnapshot {
    pub points: i32,
    pub vote_status: Option<i32>,
}

impl VoteSnapshot {
    /// The snapshot after applying `value` with the shared transition rule.
    pub fn predict(self, value: VoteValue) -> Self {
        let transition = VoteTransition::resolve(self.vote_status, value);
        Self {
            points: self.points + transition.delta,
            vote_status: Some(transition.stored),
        }
    }
}

impl From<VoteResponse> for VoteSnapshot {
    fn from(res: VoteResponse) -> Self {
        Self {
            points: res.points,
            vote_status: Some(res.vote_status),
        }
    }
}

/// Handle for one optimistic write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Ticket {
    post_id: i64,
    seq: u64,
}

impl Ticket {
    pub fn post_id(&self) -> i64 {
        self.post_id
    }
}

#[derive(Debug)]
struct Pending {
    seq: u64,
    /// What the cache held before this click; restored if it fails.
    base: VoteSnapshot,
}

#[derive(Debug, Default)]
struct PostLedger {
    pending: Vec<Pending>,
    /// Sequence of the newest click whose server values were written.
    confirmed: u64,
}

#[derive(Debug, Default)]
pub struct OptimisticVotes {
    next_seq: u64,
    posts: HashMap<i64, PostLedger>,
}

impl OptimisticVotes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the predicted outcome of a click. Returns `None`, and writes
    /// nothing, when the post is not cached.
    pub fn apply(&mut self, cache: &mut Cache, post_id: i64, value: VoteValue) -> Option<Ticket> {
        let post = cache.post(post_id)?;
        let base = VoteSnapshot {
            points: post.points,
            vote_status: post.vote_status,
        };
        let predicted = base.predict(value);
        cache.write_vote(post_id, predicted.points, predicted.vote_status);

        self.next_seq += 1;
        let seq = self.next_seq;
        self.posts
            .entry(post_id)
            .or_default()
            .pending
            .push(Pending { seq, base });

        debug!(
            "Optimistic vote #{} on post {}: {:?} -> {:?}",
            seq, post_id, base, predicted
        );
        Some(Ticket { post_id, seq })
    }

    /// Reconcile a click the server accepted.
    pub fn confirm(&mut self, cache: &mut Cache, ticket: Ticket, server: VoteResponse) {
        let Some((ledger, _)) = self.take(ticket) else {
            return;
        };
        let server = VoteSnapshot::from(server);

        if let Some(next) = ledger.pending.iter_mut().find(|p| p.seq > ticket.seq) {
            // A later click is still showing its own prediction.
            next.base = server;
        } else if ledger.confirmed < ticket.seq {
            cache.write_vote(ticket.post_id, server.points, server.vote_status);
            ledger.confirmed = ticket.seq;
        }

        self.tidy(ticket.post_id);
    }

    /// Undo a click the server rejected or never saw.
    pub fn rollback(&mut self, cache: &mut Cache, ticket: Ticket) {
        let Some((ledger, base)) = self.take(ticket) else {
            return;
        };

        if let Some(next) = ledger.pending.iter_mut().find(|p| p.seq > ticket.seq) {
            next.base = base;
        } else if ledger.confirmed < ticket.seq {
            cache.write_vote(ticket.post_id, base.points, base.vote_status);
            debug!("Rolled back vote #{} on post {} to {:?}", ticket.seq, ticket.post_id, base);
        }

        self.tidy(ticket.post_id);
    }

    pub fn pending(&self, post_id: i64) -> usize {
        self.posts.get(&post_id).map_or(0, |l| l.pending.len())
    }

    fn take(&mut self, ticket: Ticket) -> Option<(&mut PostLedger, VoteSnapshot)> {
        let ledger = self.posts.get_mut(&ticket.post_id)?;
        let idx = ledger.pending.iter().position(|p| p.seq == ticket.seq)?;
        let entry = ledger.pending.remove(idx);
        Some((ledger, entry.base))
    }

    fn tidy(&mut self, post_id: i64) {
        if self.posts.get(&post_id).is_some_and(|l| l.pending.is_empty()) {
            self.posts.remove(&post_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::post;

    fn cache_with(points: i32, vote_status: Option<i32>) -> Cache {
        let mut cache = Cache::new();
        cache.write_post(post(7, points, vote_status));
        cache
    }

    fn shown(cache: &Cache) -> (i32, Option<i32>) {
        let p = cache.post(7).unwrap();
        (p.points, p.vote_status)
    }

    fn response(points: i32, vote_status: i32) -> VoteResponse {
        VoteResponse {
            post_id: 7,
            points,
            vote_status,
        }
    }

    #[test]
    fn prediction_follows_the_transition_rule() {
        let fresh = VoteSnapshot { points: 5, vote_status: None };
        assert_eq!(fresh.predict(VoteValue::Up), VoteSnapshot { points: 6, vote_status: Some(1) });

        let up = VoteSnapshot { points: 6, vote_status: Some(1) };
        assert_eq!(up.predict(VoteValue::Up), VoteSnapshot { points: 5, vote_status: Some(0) });
        assert_eq!(up.predict(VoteValue::Down), VoteSnapshot { points: 4, vote_status: Some(-1) });

        let retracted = VoteSnapshot { points: 5, vote_status: Some(0) };
        assert_eq!(retracted.predict(VoteValue::Down), VoteSnapshot { points: 4, vote_status: Some(-1) });
    }

    #[test]
    fn confirm_writes_server_values() {
        let mut cache = cache_with(5, None);
        let mut votes = OptimisticVotes::new();

        let ticket = votes.apply(&mut cache, 7, VoteValue::Up).unwrap();
        assert_eq!(shown(&cache), (6, Some(1)));

        // Someone else voted in the meantime.
        votes.confirm(&mut cache, ticket, response(7, 1));
        assert_eq!(shown(&cache), (7, Some(1)));
        assert_eq!(votes.pending(7), 0);
    }

    #[test]
    fn rollback_restores_pre_click_values() {
        let mut cache = cache_with(5, None);
        let mut votes = OptimisticVotes::new();

        let ticket = votes.apply(&mut cache, 7, VoteValue::Down).unwrap();
        assert_eq!(shown(&cache), (4, Some(-1)));

        votes.rollback(&mut cache, ticket);
        assert_eq!(shown(&cache), (5, None));
    }

    #[test]
    fn uncached_post_gets_no_ticket() {
        let mut cache = Cache::new();
        let mut votes = OptimisticVotes::new();
        assert!(votes.apply(&mut cache, 7, VoteValue::Up).is_none());
    }

    #[test]
    fn rapid_clicks_keep_the_latest_prediction_visible() {
        let mut cache = cache_with(5, None);
        let mut votes = OptimisticVotes::new();

        let first = votes.apply(&mut cache, 7, VoteValue::Up).unwrap();
        let second = votes.apply(&mut cache, 7, VoteValue::Up).unwrap();
        assert_eq!(shown(&cache), (5, Some(0)));

        votes.confirm(&mut cache, first, response(6, 1));
        assert_eq!(shown(&cache), (5, Some(0)));

        votes.confirm(&mut cache, second, response(5, 0));
        assert_eq!(shown(&cache), (5, Some(0)));
    }

    #[test]
    fn failed_second_click_reverts_to_confirmed_first() {
        let mut cache = cache_with(5, None);
        let mut votes = OptimisticVotes::new();

        let first = votes.apply(&mut cache, 7, VoteValue::Up).unwrap();
        let second = votes.apply(&mut cache, 7, VoteValue::Down).unwrap();
        assert_eq!(shown(&cache), (4, Some(-1)));

        votes.confirm(&mut cache, first, response(6, 1));
        votes.rollback(&mut cache, second);
        assert_eq!(shown(&cache), (6, Some(1)));
    }

    #[test]
    fn failed_first_click_passes_its_base_on() {
        let mut cache = cache_with(5, None);
        let mut votes = OptimisticVotes::new();

        let first = votes.apply(&mut cache, 7, VoteValue::Up).unwrap();
        let second = votes.apply(&mut cache, 7, VoteValue::Down).unwrap();

        votes.rollback(&mut cache, first);
        assert_eq!(shown(&cache), (4, Some(-1)));

        votes.rollback(&mut cache, second);
        assert_eq!(shown(&cache), (5, None));
    }

    #[test]
    fn stale_confirmation_does_not_overwrite_newer_state() {
        let mut cache = cache_with(5, None);
        let mut votes = OptimisticVotes::new();

        let first = votes.apply(&mut cache, 7, VoteValue::Up).unwrap();
        let second = votes.apply(&mut cache, 7, VoteValue::Down).unwrap();

        votes.confirm(&mut cache, second, response(4, -1));
        votes.confirm(&mut cache, first, response(6, 1));
        assert_eq!(shown(&cache), (4, Some(-1)));
    }
}
