//! Single-flight memoizer
//!
//! `Cached<T>` holds at most one computation of a value, shared by every
//! caller until the value expires. Concurrent callers that arrive while the
//! computation is running await the same future instead of starting their
//! own.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::CodedError;

type SharedResult<T> = Shared<BoxFuture<'static, Result<T, CodedError>>>;

struct Slot<T> {
    /// Distinguishes this computation from later ones
    generation: u64,
    future: SharedResult<T>,
    expires_at: DateTime<Utc>,
}

struct State<T> {
    slot: Option<Slot<T>>,
    next_generation: u64,
}

/// A memoized value along with its remaining lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
    /// Time left before expiry, measured when the call started
    pub ttl: Duration,
}

/// Deduplicates recomputation of one value until an explicit expiry
pub struct Cached<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                slot: None,
                next_generation: 0,
            }),
        }
    }
}

impl<T> Cached<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value, computing it with `getter` if needed
    ///
    /// # Arguments
    /// * `getter` - Produces the value; only called when nothing live is cached
    /// * `expires_at` - Expiry recorded if this call starts a new computation
    pub async fn get<F, Fut>(
        &self,
        getter: F,
        expires_at: DateTime<Utc>,
    ) -> Result<CachedResult<T>, CodedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CodedError>> + Send + 'static,
    {
        self.get_at(getter, expires_at, Utc::now()).await
    }

    /// Same as [`Cached::get`] with an explicit clock
    pub async fn get_at<F, Fut>(
        &self,
        getter: F,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<CachedResult<T>, CodedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CodedError>> + Send + 'static,
    {
        let (generation, future, expires_at) = {
            let mut state = self.state.lock().await;

            if state
                .slot
                .as_ref()
                .is_some_and(|slot| slot.expires_at <= now)
            {
                tracing::debug!("cached value expired");
                state.slot = None;
            }

            match &state.slot {
                Some(slot) => (slot.generation, slot.future.clone(), slot.expires_at),
                None => {
                    let generation = state.next_generation;
                    state.next_generation += 1;
                    let future = getter().boxed().shared();
                    state.slot = Some(Slot {
                        generation,
                        future: future.clone(),
                        expires_at,
                    });
                    (generation, future, expires_at)
                }
            }
        };

        match future.await {
            Ok(value) => Ok(CachedResult {
                value,
                expires_at,
                ttl: expires_at - now,
            }),
            Err(err) => {
                let mut state = self.state.lock().await;
                if state
                    .slot
                    .as_ref()
                    .is_some_and(|slot| slot.generation == generation)
                {
                    state.slot = None;
                }
                Err(err)
            }
        }
    }

    /// Drops any cached or in-flight value
    pub async fn invalidate(&self) {
        self.state.lock().await.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("valid timestamp")
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_computation() {
        let cached = Arc::new(Cached::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let now = at("2024-07-15T12:00:00Z");
        let expires = at("2024-07-16T00:00:00Z");

        let requests = (0..16).map(|_| {
            let cached = cached.clone();
            let calls = calls.clone();
            async move {
                cached
                    .get_at(
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                            Ok(7)
                        },
                        expires,
                        now,
                    )
                    .await
            }
        });

        let results = futures::future::join_all(requests).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "getter should run once");
        for result in results {
            let result = result.expect("computation succeeds");
            assert_eq!(result.value, 7);
            assert_eq!(result.ttl, Duration::hours(12));
        }
    }

    #[tokio::test]
    async fn test_live_value_is_reused_and_keeps_first_expiry() {
        let cached = Cached::<&'static str>::new();
        let now = at("2024-07-15T12:00:00Z");
        let first_expiry = at("2024-07-15T18:00:00Z");

        cached
            .get_at(|| async { Ok("first") }, first_expiry, now)
            .await
            .expect("first get");
        let second = cached
            .get_at(
                || async { Ok("second") },
                at("2024-07-20T00:00:00Z"),
                at("2024-07-15T13:00:00Z"),
            )
            .await
            .expect("second get");

        assert_eq!(second.value, "first");
        assert_eq!(second.expires_at, first_expiry);
        assert_eq!(second.ttl, Duration::hours(5));
    }

    #[tokio::test]
    async fn test_expired_value_triggers_exactly_one_new_computation() {
        let cached = Cached::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let getter = |calls: Arc<AtomicUsize>| {
            move || async move { Ok::<_, CodedError>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        };

        let first = cached
            .get_at(
                getter(calls.clone()),
                at("2024-07-15T18:00:00Z"),
                at("2024-07-15T12:00:00Z"),
            )
            .await
            .expect("first");
        assert_eq!(first.value, 1);

        let after_expiry = at("2024-07-15T18:00:01Z");
        let refreshed = cached
            .get_at(getter(calls.clone()), at("2024-07-16T00:00:00Z"), after_expiry)
            .await
            .expect("refresh");
        let reused = cached
            .get_at(getter(calls.clone()), at("2024-07-16T00:00:00Z"), after_expiry)
            .await
            .expect("reuse");

        assert_eq!(refreshed.value, 2);
        assert_eq!(reused.value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_the_cache() {
        let cached = Cached::<u8>::new();
        let now = at("2024-07-15T12:00:00Z");
        let expires = at("2024-07-16T00:00:00Z");

        let failed = cached
            .get_at(
                || async { Err(CodedError::bare(ErrorCode::WeatherApiError)) },
                expires,
                now,
            )
            .await;
        assert_eq!(failed.unwrap_err().code, ErrorCode::WeatherApiError);

        let retried = cached
            .get_at(|| async { Ok(3) }, expires, now)
            .await
            .expect("retry succeeds");
        assert_eq!(retried.value, 3);
    }

    #[tokio::test]
    async fn test_invalidate_forces_recompute() {
        let cached = Cached::<u8>::new();
        let now = at("2024-07-15T12:00:00Z");
        let expires = at("2024-07-16T00:00:00Z");

        cached.get_at(|| async { Ok(1) }, expires, now).await.expect("first");
        cached.invalidate().await;
        let value = cached.get_at(|| async { Ok(2) }, expires, now).await.expect("second");
        assert_eq!(value.value, 2);
    }
}
