//! Request-scoped micro-batching.
//!
//! A [`BatchLoader`] turns many `load(key)` calls into one call to its
//! [`BatchFn`]. The first caller of a round schedules the flush: it yields
//! once to the executor so every sibling future polled in the same turn
//! (typically the branches of a `join_all` over a page of rows) can enqueue
//! its key, then drains the queue and issues a single batched lookup.
//!
//! Resolved values are cached for the loader's lifetime. Loaders are built per
//! request, so nothing is shared across requests and nothing goes stale.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Bulk lookup behind a loader.
pub trait BatchFn: Send + Sync {
    type Key: Clone + Eq + Hash + Debug + Send;
    type Value: Clone + Send;

    /// Look up every key with one underlying query. The result must have one
    /// entry per key, in input order, with `None` for keys that do not exist.
    fn load_many(
        &self,
        keys: Vec<Self::Key>,
    ) -> impl Future<Output = anyhow::Result<Vec<Option<Self::Value>>>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("batch load failed: {0}")]
    Batch(String),

    #[error("batch returned {got} values for {expected} keys")]
    Mismatch { expected: usize, got: usize },

    #[error("batch was abandoned before it resolved")]
    Abandoned,

    #[error("loader state poisoned")]
    Poisoned,
}

type Reply<V> = oneshot::Sender<Result<Option<V>, LoadError>>;

struct LoaderState<K, V> {
    cache: HashMap<K, Option<V>>,
    queue: Vec<(K, Reply<V>)>,
    flush_scheduled: bool,
}

pub struct BatchLoader<B: BatchFn> {
    batch_fn: B,
    state: Mutex<LoaderState<B::Key, B::Value>>,
    batches: AtomicUsize,
}

impl<B: BatchFn> BatchLoader<B> {
    pub fn new(batch_fn: B) -> Self {
        Self {
            batch_fn,
            state: Mutex::new(LoaderState {
                cache: HashMap::new(),
                queue: Vec::new(),
                flush_scheduled: false,
            }),
            batches: AtomicUsize::new(0),
        }
    }

    /// Number of batched lookups issued so far.
    pub fn batches_dispatched(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    pub async fn load(&self, key: B::Key) -> Result<Option<B::Value>, LoadError> {
        let (rx, leader) = {
            let mut state = self.state.lock().map_err(|_| LoadError::Poisoned)?;
            if let Some(hit) = state.cache.get(&key) {
                return Ok(hit.clone());
            }

            let (tx, rx) = oneshot::channel();
            state.queue.push((key, tx));
            let leader = !state.flush_scheduled;
            state.flush_scheduled = true;
            (rx, leader)
        };

        if leader {
            tokio::task::yield_now().await;
            self.flush().await?;
        }

        rx.await.map_err(|_| LoadError::Abandoned)?
    }

    async fn flush(&self) -> Result<(), LoadError> {
        let queue = match self.state.lock() {
            Ok(mut state) => {
                state.flush_scheduled = false;
                std::mem::take(&mut state.queue)
            }
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                state.flush_scheduled = false;
                fail_all(std::mem::take(&mut state.queue), LoadError::Poisoned);
                return Err(LoadError::Poisoned);
            }
        };

        let mut seen = HashSet::new();
        let keys: Vec<B::Key> = queue
            .iter()
            .filter(|(k, _)| seen.insert(k.clone()))
            .map(|(k, _)| k.clone())
            .collect();

        debug!("Flushing batch of {} keys ({} waiters)", keys.len(), queue.len());
        self.batches.fetch_add(1, Ordering::Relaxed);

        let resolved = match self.batch_fn.load_many(keys.clone()).await {
            Ok(values) if values.len() == keys.len() => Ok(keys.into_iter().zip(values).collect::<HashMap<_, _>>()),
            Ok(values) => Err(LoadError::Mismatch {
                expected: keys.len(),
                got: values.len(),
            }),
            Err(e) => Err(LoadError::Batch(format!("{:#}", e))),
        };

        match resolved {
            Ok(values) => match self.state.lock() {
                Ok(mut state) => {
                    for (key, reply) in queue {
                        let value = values.get(&key).cloned().flatten();
                        state.cache.insert(key, value.clone());
                        let _ = reply.send(Ok(value));
                    }
                }
                Err(_) => fail_all(queue, LoadError::Poisoned),
            },
            Err(e) => fail_all(queue, e),
        }

        Ok(())
    }
}

fn fail_all<K, V>(queue: Vec<(K, Reply<V>)>, err: LoadError) {
    for (_, reply) in queue {
        let _ = reply.send(Err(err.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::Arc;

    /// Squares even keys, treats odd keys as missing, and records each batch.
    #[derive(Default, Clone)]
    struct Squares {
        calls: Arc<Mutex<Vec<Vec<i64>>>>,
        fail: bool,
    }

    impl BatchFn for Squares {
        type Key = i64;
        type Value = i64;

        async fn load_many(&self, keys: Vec<i64>) -> anyhow::Result<Vec<Option<i64>>> {
            self.calls.lock().unwrap().push(keys.clone());
            if self.fail {
                anyhow::bail!("database is locked");
            }
            Ok(keys.iter().map(|k| (k % 2 == 0).then_some(k * k)).collect())
        }
    }

    #[tokio::test]
    async fn keys_from_one_turn_share_a_batch() {
        let squares = Squares::default();
        let loader = BatchLoader::new(squares.clone());

        let results = join_all([4, 3, 4, 10, 7].map(|k| loader.load(k))).await;
        let values: Vec<_> = results.into_iter().map(Result::unwrap).collect();

        assert_eq!(values, vec![Some(16), None, Some(16), Some(100), None]);
        assert_eq!(loader.batches_dispatched(), 1);
        assert_eq!(*squares.calls.lock().unwrap(), vec![vec![4, 3, 10, 7]]);
    }

    #[tokio::test]
    async fn resolved_keys_are_served_from_the_request_cache() {
        let squares = Squares::default();
        let loader = BatchLoader::new(squares.clone());

        assert_eq!(loader.load(2).await.unwrap(), Some(4));
        assert_eq!(loader.load(2).await.unwrap(), Some(4));
        assert_eq!(loader.load(3).await.unwrap(), None);
        assert_eq!(loader.load(3).await.unwrap(), None);

        assert_eq!(loader.batches_dispatched(), 2);
    }

    /// Holds its batch open until the gate is opened.
    struct Gated {
        gate: Arc<tokio::sync::Notify>,
    }

    impl BatchFn for Gated {
        type Key = i64;
        type Value = i64;

        async fn load_many(&self, keys: Vec<i64>) -> anyhow::Result<Vec<Option<i64>>> {
            self.gate.notified().await;
            Ok(keys.into_iter().map(Some).collect())
        }
    }

    #[tokio::test]
    async fn poisoned_state_is_reported_to_every_waiter() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let loader = BatchLoader::new(Gated { gate: gate.clone() });

        let loads = join_all([1, 2].map(|k| loader.load(k)));
        let poison = async {
            tokio::task::yield_now().await;
            std::thread::scope(|s| {
                let _ = s
                    .spawn(|| {
                        let _guard = loader.state.lock().unwrap();
                        panic!("poisoning loader state");
                    })
                    .join();
            });
            gate.notify_one();
        };

        let (results, ()) = tokio::join!(loads, poison);
        assert!(
            results.iter().all(|r| matches!(r, Err(LoadError::Poisoned))),
            "{results:?}"
        );
    }

    #[tokio::test]
    async fn batch_failure_reaches_every_waiter() {
        let loader = BatchLoader::new(Squares {
            fail: true,
            ..Squares::default()
        });

        let results = join_all([1, 2, 3].map(|k| loader.load(k))).await;
        assert!(results.iter().all(|r| matches!(r, Err(LoadError::Batch(_)))));
        assert_eq!(loader.batches_dispatched(), 1);
    }
}
