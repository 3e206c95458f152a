//! Per-key single-flight coordination.
//!
//! Concurrent callers asking for the same key share one in-flight future. The registry
//! entry lives exactly as long as the leader's computation; once it completes (or the
//! leader is dropped) the next caller starts a fresh flight.

use std::{any::Any, future::Future};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use metrics::counter;
use tracing::debug;

const METRIC_FLIGHT_JOINED: &str = "marketlens_cache_flight_joined_total";

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

#[derive(Default)]
pub struct SingleFlight {
    inflight: DashMap<String, Box<dyn Any + Send + Sync>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a computation currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Run `work` unless a flight for `key` is already running, in which case wait for
    /// that flight and return its result instead.
    pub async fn run<T, E, Fut>(&self, key: &str, work: Fut) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let candidate: Flight<T, E> = work.boxed().shared();
        let joined = match self.inflight.entry(key.to_string()) {
            // A different value type under the same key yields `None`; run unshared.
            Entry::Occupied(existing) => existing
                .get()
                .downcast_ref::<Flight<T, E>>()
                .map(|flight| (flight.clone(), false)),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(candidate.clone()));
                Some((candidate.clone(), true))
            }
        };

        let Some((flight, leader)) = joined else {
            return candidate.await;
        };

        if leader {
            let _guard = FlightGuard {
                registry: &self.inflight,
                key,
                flight: &flight,
            };
            flight.clone().await
        } else {
            counter!(METRIC_FLIGHT_JOINED).increment(1);
            debug!(target: "marketlens::cache::flight", key, "joined in-flight computation");
            flight.await
        }
    }
}

/// Removes the leader's registry entry on completion or cancellation.
struct FlightGuard<'a, T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    registry: &'a DashMap<String, Box<dyn Any + Send + Sync>>,
    key: &'a str,
    flight: &'a Flight<T, E>,
}

impl<T, E> Drop for FlightGuard<'_, T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.registry.remove_if(self.key, |_, registered| {
            registered
                .downcast_ref::<Flight<T, E>>()
                .is_some_and(|current| current.ptr_eq(self.flight))
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let flights = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = flights.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                flights
                    .run("answer", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<u32, String>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("join"), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_reach_every_waiter_and_are_not_retained() {
        let flights = Arc::new(SingleFlight::new());

        let first = {
            let flights = flights.clone();
            tokio::spawn(async move {
                flights
                    .run("broken", async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err::<u32, String>("db down".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = flights.run("broken", async { Ok::<u32, String>(1) }).await;

        assert_eq!(first.await.expect("join"), Err("db down".to_string()));
        assert_eq!(second, Err("db down".to_string()));

        let retry = flights.run("broken", async { Ok::<u32, String>(7) }).await;
        assert_eq!(retry, Ok(7));
    }
}
