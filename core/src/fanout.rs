//! # Bounded Fan-Out
//!
//! Runs one sub-probe per target with at most `ceiling` of them in flight,
//! and returns only after every target has reported.
//!
//! Each sub-probe runs in its own task. A sub-probe that panics is recorded as
//! [`TargetFailure::Aborted`] in its own slot; siblings are unaffected. All
//! bookkeeping (slots, in-flight counter, peak) sits behind one mutex owned by
//! the call.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use netprobe_common::network::target::ProbeTarget;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FanOutError {
    #[error("concurrency ceiling must be at least 1")]
    ZeroCeiling,
    #[error("target {0} appears more than once")]
    DuplicateTarget(String),
    #[error("fan-out task failed: {0}")]
    Join(String),
}

/// A target whose sub-probe produced no outcome of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetFailure {
    Aborted(String),
}

impl std::fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetFailure::Aborted(reason) => write!(f, "probe aborted: {reason}"),
        }
    }
}

pub type Slot<O> = Result<O, TargetFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    ceiling: usize,
}

struct Shared<O> {
    slots: Vec<Option<Slot<O>>>,
    in_flight: usize,
    peak: usize,
}

impl<O> Shared<O> {
    fn lock(state: &Mutex<Self>) -> std::sync::MutexGuard<'_, Self> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Aborts the wrapped task if the fan-out is cancelled.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl FanOut {
    pub fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub async fn run<T, O, F, Fut>(&self, targets: Vec<T>, probe: F) -> Result<Aggregate<T, O>, FanOutError>
    where
        T: ProbeTarget + Clone,
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        if self.ceiling == 0 {
            return Err(FanOutError::ZeroCeiling);
        }

        let mut seen: BTreeSet<T::Id> = BTreeSet::new();
        for target in &targets {
            let id = target.id();
            if !seen.insert(id.clone()) {
                return Err(FanOutError::DuplicateTarget(format!("{id:?}")));
            }
        }

        debug!(targets = targets.len(), ceiling = self.ceiling, "starting fan-out");

        let state: Arc<Mutex<Shared<O>>> = Arc::new(Mutex::new(Shared {
            slots: (0..targets.len()).map(|_| None).collect(),
            in_flight: 0,
            peak: 0,
        }));
        let semaphore: Arc<Semaphore> = Arc::new(Semaphore::new(self.ceiling));
        let probe: Arc<F> = Arc::new(probe);
        let mut tasks: JoinSet<()> = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let state = state.clone();
            let semaphore = semaphore.clone();
            let probe = probe.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    record(&state, index, Err(TargetFailure::Aborted("semaphore closed".into())));
                    return;
                };

                {
                    let mut shared = Shared::lock(&state);
                    shared.in_flight += 1;
                    shared.peak = shared.peak.max(shared.in_flight);
                }

                let mut handle = AbortOnDrop(tokio::spawn(probe(target)));
                let outcome: Slot<O> = (&mut handle.0)
                    .await
                    .map_err(|e| TargetFailure::Aborted(join_reason(&e)));

                let mut shared = Shared::lock(&state);
                shared.in_flight -= 1;
                fill(&mut shared, index, outcome);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("fan-out worker failed: {e}");
                return Err(FanOutError::Join(e.to_string()));
            }
        }

        let (slots, peak) = {
            let mut shared = Shared::lock(&state);
            (std::mem::take(&mut shared.slots), shared.peak)
        };

        let entries: Vec<(T, Slot<O>)> = targets
            .into_iter()
            .zip(slots)
            .map(|(target, slot)| {
                let outcome = slot.unwrap_or_else(|| Err(TargetFailure::Aborted("no outcome recorded".into())));
                (target, outcome)
            })
            .collect();

        Ok(Aggregate {
            entries,
            peak_in_flight: peak,
        })
    }
}

fn record<O>(state: &Mutex<Shared<O>>, index: usize, outcome: Slot<O>) {
    let mut shared = Shared::lock(state);
    fill(&mut shared, index, outcome);
}

fn fill<O>(shared: &mut Shared<O>, index: usize, outcome: Slot<O>) {
    if let Some(slot) = shared.slots.get_mut(index) {
        if slot.is_none() {
            *slot = Some(outcome);
        }
    }
}

fn join_reason(e: &tokio::task::JoinError) -> String {
    if e.is_panic() {
        "sub-probe panicked".to_string()
    } else {
        "sub-probe was cancelled".to_string()
    }
}

/// Per-target outcomes in input order.
#[derive(Debug)]
pub struct Aggregate<T, O> {
    entries: Vec<(T, Slot<O>)>,
    peak_in_flight: usize,
}

impl<T, O> Aggregate<T, O> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest number of sub-probes observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &Slot<O>)> {
        self.entries.iter().map(|(target, slot)| (target, slot))
    }

    pub fn into_entries(self) -> Vec<(T, Slot<O>)> {
        self.entries
    }

    pub fn count(&self, predicate: impl Fn(&Slot<O>) -> bool) -> usize {
        self.entries.iter().filter(|(_, slot)| predicate(slot)).count()
    }

    /// `count` as a share of all targets, 0 when there are none.
    pub fn percentage(&self, count: usize) -> f64 {
        percentage(count, self.entries.len())
    }
}

pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Most frequent value; ties go to the value seen first.
pub fn most_common<V, I>(values: I) -> Option<(V, usize)>
where
    V: Eq + Hash + Clone,
    I: IntoIterator<Item = V>,
{
    let mut counts: HashMap<V, (usize, usize)> = HashMap::new();
    for (position, value) in values.into_iter().enumerate() {
        counts.entry(value).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(value, (count, _))| (value, count))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
