//! Per-resource fan-out shared by all checks
//!
//! A check hands [`fan_out`] its list of resources and an evaluation that makes
//! one provider call per resource. Every evaluation runs on its own tokio task.
//! Verdicts and failures land in two separately locked accumulators, and
//! neither lock is held across a provider call.

use anyhow::anyhow;
use integrity_common::AggregateError;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Lock a mutex, recovering the data if a holder panicked
///
/// Holders only push or insert, so the data is consistent even after a
/// panic elsewhere in the task.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Optional cap on concurrently running sub-tasks of one fan-out
///
/// Unbounded by default: one task per resource, all in flight at once.
/// Only the cap is carried here; every [`fan_out`] call gets its own permits,
/// so checks sharing the same settings never compete with each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConcurrencyLimit {
    max: Option<usize>,
}

impl ConcurrencyLimit {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Cap concurrency at `max` tasks; `None` or `Some(0)` means unbounded
    pub fn new(max: Option<usize>) -> Self {
        Self {
            max: max.filter(|n| *n > 0),
        }
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    fn semaphore(&self) -> Option<Arc<Semaphore>> {
        self.max.map(|n| Arc::new(Semaphore::new(n)))
    }
}

async fn acquire(semaphore: Option<Arc<Semaphore>>) -> Option<OwnedSemaphorePermit> {
    // The semaphore is never closed, so acquisition cannot fail
    semaphore?.acquire_owned().await.ok()
}

/// Accumulators written by the sub-tasks of one check run
///
/// Entries map a resource identifier to its violation detail.
#[derive(Debug)]
pub struct Findings<V> {
    entries: Mutex<BTreeMap<String, V>>,
    errors: Mutex<AggregateError>,
}

impl<V> Default for Findings<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            errors: Mutex::new(AggregateError::new()),
        }
    }
}

impl<V> Findings<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, key: String, value: V) {
        lock(&self.entries).insert(key, value);
    }

    pub fn record_error(&self, error: anyhow::Error) {
        lock(&self.errors).push(error);
    }

    /// Move the accumulated entries and errors out
    pub fn take(&self) -> (BTreeMap<String, V>, AggregateError) {
        let entries = std::mem::take(&mut *lock(&self.entries));
        let errors = std::mem::take(&mut *lock(&self.errors));
        (entries, errors)
    }
}

/// Run `evaluate` once per item, each on its own task, and collect the verdicts
///
/// An evaluation returns `Ok(Some((key, detail)))` for a violation, `Ok(None)` for
/// a pass, and `Err` if it could not reach a verdict. A failing evaluation never
/// stops its siblings. Returns only after every task has joined.
pub async fn fan_out<T, V, F, Fut>(
    items: Vec<T>,
    limit: &ConcurrencyLimit,
    mut evaluate: F,
) -> (BTreeMap<String, V>, AggregateError)
where
    V: Send + 'static,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<(String, V)>>> + Send + 'static,
{
    let findings = Arc::new(Findings::new());
    let semaphore = limit.semaphore();
    let mut tasks = JoinSet::new();

    for item in items {
        let verdict = evaluate(item);
        let findings = Arc::clone(&findings);
        let semaphore = semaphore.clone();

        tasks.spawn(
            async move {
                let _permit = acquire(semaphore).await;
                match verdict.await {
                    Ok(Some((key, value))) => findings.record(key, value),
                    Ok(None) => {}
                    Err(e) => findings.record_error(e),
                }
            }
            .in_current_span(),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            findings.record_error(anyhow!("sub-task did not complete: {e}"));
        }
    }

    findings.take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn no_lost_updates_under_contention() {
        let items: Vec<usize> = (0..200).collect();

        let (entries, errors) = fan_out(items, &ConcurrencyLimit::unbounded(), |n| async move {
            tokio::time::sleep(Duration::from_millis((n % 7) as u64)).await;
            match n {
                n if n % 10 == 0 => Err(anyhow!("sub-task {n} failed")),
                n if n % 3 == 0 => Ok(Some((format!("res-{n}"), n))),
                _ => Ok(None),
            }
        })
        .await;

        let expected_violations = (0..200).filter(|n| n % 10 != 0 && n % 3 == 0).count();
        let expected_errors = (0..200).filter(|n| n % 10 == 0).count();

        assert_eq!(entries.len(), expected_violations);
        assert_eq!(errors.len(), expected_errors);
        for (key, value) in &entries {
            assert_eq!(key, &format!("res-{value}"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn limit_caps_in_flight_tasks() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<u32> = (0..50).collect();
        let (entries, errors) = fan_out(items, &ConcurrencyLimit::new(Some(3)), |n| {
            tracked(Arc::clone(&in_flight), Arc::clone(&peak), n)
        })
        .await;

        assert_eq!(entries.len(), 50);
        assert!(errors.is_empty());
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    /// Count the task as in flight for a short while, tracking the peak
    async fn tracked(
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        n: u32,
    ) -> anyhow::Result<Option<(String, ())>> {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some((n.to_string(), ())))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_fan_outs_each_get_their_own_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        // Both fan-outs take the limit from the same settings, as checks do
        let limit = ConcurrencyLimit::new(Some(2));

        let run = |limit: ConcurrencyLimit| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                fan_out((0..20).collect::<Vec<u32>>(), &limit, |n| {
                    tracked(Arc::clone(&in_flight), Arc::clone(&peak), n)
                })
                .await
            }
        };
        let ((first, _), (second, _)) = tokio::join!(run(limit), run(limit));

        assert_eq!(first.len(), 20);
        assert_eq!(second.len(), 20);
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak > 2, "fan-outs shared one cap: combined peak {peak}");
        assert!(peak <= 4, "a fan-out exceeded its cap: combined peak {peak}");
    }

    #[tokio::test]
    async fn panicking_sub_task_is_recorded() {
        let limit = ConcurrencyLimit::unbounded();
        let (entries, errors) = fan_out(vec![1, 2, 3], &limit, |n| async move {
            if n == 2 {
                panic!("sub-task exploded");
            }
            Ok(Some((n.to_string(), n)))
        })
        .await;

        assert_eq!(entries.len(), 2);
        assert_eq!(errors.len(), 1);
        assert!(errors.errors()[0].to_string().contains("sub-task did not complete"));
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let (entries, errors) =
            fan_out(Vec::<u8>::new(), &ConcurrencyLimit::unbounded(), |_| async {
                Ok(Some(("x".to_string(), ())))
            })
            .await;
        assert!(entries.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn zero_limit_is_unbounded() {
        assert_eq!(ConcurrencyLimit::new(Some(0)).max(), None);
        assert_eq!(ConcurrencyLimit::new(Some(16)).max(), Some(16));
        assert_eq!(ConcurrencyLimit::new(None).max(), None);
    }
}
