//! Background cluster-tree rebuilds.
//!
//! One worker thread owns the [`TreeBuilder`]. Every submission bumps a
//! shared generation counter; a build in progress polls the counter between
//! tiers and abandons itself once a newer submission exists. Requests that
//! queue up while a build runs are drained and only the latest is built.
//!
//! Finished trees are swapped into a [`TreeHandle`] and announced on an mpsc
//! channel as [`RebuildCompleted`].

use anyhow::Context as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use lifeline_cluster::{BuildError, ClusterTree, TreeBuilder};
use lifeline_core::{DataVersion, Dataset, EngineConfig};

use crate::aggregate::RebuildTrigger;

// ---------------------------------------------------------------------------
// Tree handle
// ---------------------------------------------------------------------------

/// Shared pointer to the current tree, swapped atomically on rebuild.
#[derive(Debug, Clone)]
pub struct TreeHandle(Arc<RwLock<Arc<ClusterTree>>>);

impl TreeHandle {
    #[must_use]
    pub fn new(tree: ClusterTree) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(tree))))
    }

    /// Snapshot of the current tree.
    #[must_use]
    pub fn load(&self) -> Arc<ClusterTree> {
        match self.0.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the current tree unless it is already newer.
    ///
    /// Returns whether the swap happened.
    pub fn store(&self, tree: Arc<ClusterTree>) -> bool {
        let mut guard = match self.0.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.version() > tree.version() {
            return false;
        }
        *guard = tree;
        true
    }

    #[must_use]
    pub fn version(&self) -> DataVersion {
        self.load().version()
    }
}

impl Default for TreeHandle {
    fn default() -> Self {
        Self::new(ClusterTree::empty(DataVersion::default()))
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Notification sent after a tree is swapped in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildCompleted {
    pub version: DataVersion,
    pub generation: u64,
    pub elapsed: Duration,
    /// Nesting repairs recorded while building.
    pub repairs: usize,
}

enum Request {
    Build {
        dataset: Arc<Dataset>,
        generation: u64,
    },
    Shutdown,
}

#[derive(Default)]
struct Shared {
    generation: AtomicU64,
    /// Data version of the latest submission.
    submitted: AtomicU64,
    latest: Mutex<Option<Arc<Dataset>>>,
}

/// Cloneable submission side of a [`RebuildWorker`].
#[derive(Clone)]
pub struct RebuildRequester {
    shared: Arc<Shared>,
    requests: Sender<Request>,
}

impl std::fmt::Debug for RebuildRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildRequester")
            .field("generation", &self.generation())
            .field("submitted", &self.shared.submitted.load(Ordering::Acquire))
            .finish()
    }
}

impl RebuildRequester {
    /// Queue a build of `dataset`, superseding any build in progress.
    ///
    /// Returns the generation assigned to the request.
    pub fn submit(&self, dataset: Arc<Dataset>) -> u64 {
        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared
            .submitted
            .fetch_max(dataset.version().get(), Ordering::AcqRel);
        match self.shared.latest.lock() {
            Ok(mut latest) => *latest = Some(Arc::clone(&dataset)),
            Err(poisoned) => *poisoned.into_inner() = Some(Arc::clone(&dataset)),
        }

        let version = dataset.version();
        if self.requests.send(Request::Build { dataset, generation }).is_err() {
            warn!(%version, generation, "rebuild worker is gone; request dropped");
        } else {
            debug!(%version, generation, "rebuild requested");
        }
        generation
    }

    /// Generation of the newest submission.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    fn latest(&self) -> Option<Arc<Dataset>> {
        match self.shared.latest.lock() {
            Ok(latest) => latest.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl RebuildTrigger for RebuildRequester {
    /// Resubmit the latest dataset unless a build for `version` (or newer)
    /// is already queued.
    fn request_rebuild(&self, version: DataVersion) {
        if self.shared.submitted.load(Ordering::Acquire) >= version.get() {
            return;
        }
        match self.latest() {
            Some(dataset) if dataset.version() >= version => {
                self.submit(dataset);
            }
            _ => debug!(%version, "no dataset for requested rebuild"),
        }
    }
}

/// Owns the rebuild thread; dropping it stops the thread.
pub struct RebuildWorker {
    requester: RebuildRequester,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RebuildWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildWorker")
            .field("requester", &self.requester)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl RebuildWorker {
    /// Start the worker thread, publishing finished trees into `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(
        config: &EngineConfig,
        handle: TreeHandle,
    ) -> anyhow::Result<(Self, Receiver<RebuildCompleted>)> {
        let (requests, inbox) = mpsc::channel();
        let (done, completions) = mpsc::channel();
        let shared = Arc::new(Shared::default());
        let builder = TreeBuilder::new(config);

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("lifeline-rebuild".to_string())
            .spawn(move || run(&builder, &thread_shared, &inbox, &done, &handle))
            .context("Failed to spawn rebuild thread")?;

        Ok((
            Self {
                requester: RebuildRequester { shared, requests },
                thread: Some(thread),
            },
            completions,
        ))
    }

    pub fn submit(&self, dataset: Arc<Dataset>) -> u64 {
        self.requester.submit(dataset)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.requester.generation()
    }

    /// A handle that can submit requests from elsewhere.
    #[must_use]
    pub fn requester(&self) -> RebuildRequester {
        self.requester.clone()
    }

    /// Stop the thread after its current build and wait for it.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // Supersede any build in progress so it stops at the next tier.
        self.requester.shared.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.requester.requests.send(Request::Shutdown);
        if thread.join().is_err() {
            warn!("rebuild thread panicked");
        }
    }
}

impl RebuildTrigger for RebuildWorker {
    fn request_rebuild(&self, version: DataVersion) {
        self.requester.request_rebuild(version);
    }
}

impl Drop for RebuildWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    builder: &TreeBuilder,
    shared: &Shared,
    inbox: &Receiver<Request>,
    done: &Sender<RebuildCompleted>,
    handle: &TreeHandle,
) {
    while let Ok(first) = inbox.recv() {
        let mut next = first;
        let mut stop = false;
        while let Ok(queued) = inbox.try_recv() {
            match queued {
                Request::Shutdown => stop = true,
                build @ Request::Build { .. } => next = build,
            }
        }
        let Request::Build { dataset, generation } = next else {
            break;
        };
        if stop {
            break;
        }

        let started = Instant::now();
        let version = dataset.version();
        let previous = handle.load();
        let cancel = || shared.generation.load(Ordering::Acquire) != generation;

        match builder.rebuild(dataset, Some(previous.as_ref()), &cancel) {
            Ok(tree) => {
                let repairs = tree.repairs().len();
                if cancel() {
                    debug!(%version, generation, "finished build superseded; discarding");
                    continue;
                }
                if !handle.store(Arc::new(tree)) {
                    debug!(%version, generation, "newer tree already published");
                    continue;
                }
                let elapsed = started.elapsed();
                info!(%version, generation, repairs, elapsed_ms = elapsed.as_millis(), "cluster tree rebuilt");
                let _ = done.send(RebuildCompleted {
                    version,
                    generation,
                    elapsed,
                    repairs,
                });
            }
            Err(BuildError::Cancelled { version, tier }) => {
                debug!(%version, %tier, generation, "rebuild cancelled");
            }
        }
    }
    debug!("rebuild worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use lifeline_core::{Event, Normalizer};

    fn dataset(version: u64, count: i64) -> Arc<Dataset> {
        let base = Utc
            .with_ymd_and_hms(2012, 3, 1, 9, 0, 0)
            .single()
            .expect("valid instant");
        let events = (0..count).map(|i| Event::new(format!("r{i:04}"), base + ChronoDuration::hours(i * 13)));
        Arc::new(Dataset::ingest(events, DataVersion::new(version), &Normalizer::default()).0)
    }

    #[test]
    fn handle_refuses_older_trees() {
        let handle = TreeHandle::new(ClusterTree::empty(DataVersion::new(5)));
        assert!(!handle.store(Arc::new(ClusterTree::empty(DataVersion::new(4)))));
        assert_eq!(handle.version(), DataVersion::new(5));
        assert!(handle.store(Arc::new(ClusterTree::empty(DataVersion::new(6)))));
        assert_eq!(handle.version(), DataVersion::new(6));
    }

    #[test]
    fn submitted_build_is_published_and_announced() {
        let handle = TreeHandle::default();
        let (worker, completions) =
            RebuildWorker::spawn(&EngineConfig::default(), handle.clone()).expect("spawn");

        let generation = worker.submit(dataset(1, 50));
        let done = completions
            .recv_timeout(Duration::from_secs(10))
            .expect("completion");
        assert_eq!(done.version, DataVersion::new(1));
        assert_eq!(done.generation, generation);
        assert_eq!(handle.version(), DataVersion::new(1));
        assert_eq!(handle.load().event_count(), 50);
    }

    #[test]
    fn latest_submission_wins() {
        let handle = TreeHandle::default();
        let (worker, completions) =
            RebuildWorker::spawn(&EngineConfig::default(), handle.clone()).expect("spawn");

        for version in 1..=5 {
            worker.submit(dataset(version, 200));
        }
        // Older builds may finish before they are superseded, but the last
        // announcement is always the newest version.
        let mut last = None;
        while last != Some(DataVersion::new(5)) {
            let done = completions
                .recv_timeout(Duration::from_secs(10))
                .expect("completion");
            assert!(last.is_none_or(|v| v < done.version));
            last = Some(done.version);
        }
        assert_eq!(handle.version(), DataVersion::new(5));
        assert_eq!(worker.generation(), 5);
    }

    #[test]
    fn trigger_skips_versions_already_submitted() {
        let handle = TreeHandle::default();
        let (worker, completions) =
            RebuildWorker::spawn(&EngineConfig::default(), handle).expect("spawn");

        worker.submit(dataset(3, 10));
        worker.request_rebuild(DataVersion::new(3));
        worker.request_rebuild(DataVersion::new(2));
        assert_eq!(worker.generation(), 1);
        // Nothing newer than the latest dataset can be built.
        worker.request_rebuild(DataVersion::new(4));
        assert_eq!(worker.generation(), 1);

        let done = completions
            .recv_timeout(Duration::from_secs(10))
            .expect("completion");
        assert_eq!(done.version, DataVersion::new(3));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (mut worker, _completions) =
            RebuildWorker::spawn(&EngineConfig::default(), TreeHandle::default()).expect("spawn");
        worker.shutdown();
        worker.shutdown();
        // Requests after shutdown are dropped quietly.
        worker.submit(dataset(1, 3));
    }
}
