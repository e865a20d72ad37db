//! [`Timeline`]: one viewport over one evolving event snapshot.
//!
//! Owns the viewport controller, the aggregator, the rebuild worker and the
//! shared tree. Viewport transitions are applied immediately and mark the
//! node list dirty; [`Timeline::tick`] recomputes once the debounce period
//! has passed. New snapshots go to the worker and never block the caller.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use lifeline_cluster::{ClusterId, ClusterTree};
use lifeline_core::{DataVersion, Dataset, EngineConfig, Event, EventId, IngestReport, Normalizer};

use crate::aggregate::{Aggregator, VisibleNodes};
use crate::debounce::Debouncer;
use crate::rebuild::{RebuildCompleted, RebuildWorker, TreeHandle};
use crate::viewport::{ViewportController, ViewportState};

pub struct Timeline {
    normalizer: Normalizer,
    viewport: ViewportController,
    aggregator: Aggregator,
    worker: RebuildWorker,
    completions: Receiver<RebuildCompleted>,
    pending: Vec<RebuildCompleted>,
    tree: TreeHandle,
    debounce: Debouncer,
    data_version: DataVersion,
    anchored: bool,
    last: Option<VisibleNodes>,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("data_version", &self.data_version)
            .field("tree_version", &self.tree.version())
            .field("viewport", self.viewport.state())
            .finish_non_exhaustive()
    }
}

impl Timeline {
    /// Empty timeline, fully zoomed out at the Unix epoch.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the rebuild
    /// thread cannot be started.
    pub fn new(config: &EngineConfig, width_px: f64) -> anyhow::Result<Self> {
        config.validate().context("Invalid engine configuration")?;

        let tree = TreeHandle::default();
        let (worker, completions) = RebuildWorker::spawn(config, tree.clone())?;
        let aggregator = Aggregator::new(config, Arc::new(worker.requester()));

        Ok(Self {
            normalizer: Normalizer::new(config.seasons),
            viewport: ViewportController::new(config.zoom.clone(), DateTime::<Utc>::default(), width_px),
            aggregator,
            worker,
            completions,
            pending: Vec::new(),
            tree,
            debounce: Debouncer::from_millis(config.render.debounce_ms),
            data_version: DataVersion::default(),
            anchored: false,
            last: None,
        })
    }

    /// Ingest a new snapshot and schedule a rebuild for it.
    ///
    /// The current tree keeps serving until the rebuild lands. The first
    /// non-empty snapshot centres the viewport on its earliest event; later
    /// snapshots only move the origin back when they reach further into the
    /// past, keeping what is on screen in place.
    pub fn update_events(
        &mut self,
        events: impl IntoIterator<Item = Event>,
        version: DataVersion,
    ) -> IngestReport {
        let (dataset, report) = Dataset::ingest(events, version, &self.normalizer);
        self.install(dataset);
        report
    }

    /// Like [`Timeline::update_events`] for an already normalized snapshot.
    pub fn install(&mut self, dataset: Dataset) {
        if let Some(bounds) = dataset.time_bounds() {
            if !self.anchored {
                self.viewport.set_origin(bounds.start);
                self.viewport.center_on(bounds.start);
                self.anchored = true;
            } else if bounds.start < self.viewport.state().origin() {
                debug!(origin = %bounds.start, "snapshot reaches before origin");
                self.viewport.set_origin(bounds.start);
            }
        }
        self.data_version = dataset.version();
        info!(version = %self.data_version, events = dataset.len(), "event snapshot updated");
        self.worker.submit(Arc::new(dataset));
        self.debounce.note_change(Instant::now());
    }

    /// Current nodes, computed now regardless of the debounce state.
    pub fn visible_nodes(&mut self) -> VisibleNodes {
        let tree = self.tree.load();
        let nodes = self
            .aggregator
            .compute_visible_nodes(self.viewport.state(), &tree, self.data_version);
        self.debounce.reset();
        self.last = Some(nodes.clone());
        nodes
    }

    /// Recompute if a change has been quiet long enough.
    pub fn tick(&mut self, now: Instant) -> Option<VisibleNodes> {
        if self.drain_completions() > 0 {
            self.debounce.note_change(now);
        }
        if self.debounce.ready(now) {
            return Some(self.visible_nodes());
        }
        None
    }

    /// Most recently computed nodes.
    #[must_use]
    pub const fn last_nodes(&self) -> Option<&VisibleNodes> {
        self.last.as_ref()
    }

    /// Rebuild notifications received since the last poll, including those
    /// already seen by [`Timeline::tick`] or [`Timeline::wait_until_current`].
    pub fn poll_completed(&mut self) -> Vec<RebuildCompleted> {
        if self.drain_completions() > 0 {
            self.debounce.note_change(Instant::now());
        }
        std::mem::take(&mut self.pending)
    }

    /// Block until the tree reaches the current data version.
    ///
    /// Returns false on timeout.
    pub fn wait_until_current(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.tree.version() < self.data_version {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.completions.recv_timeout(left) {
                Ok(done) => {
                    debug!(version = %done.version, "rebuild landed");
                    self.pending.push(done);
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        self.tree.version() >= self.data_version
    }

    fn drain_completions(&mut self) -> usize {
        let before = self.pending.len();
        self.pending.extend(self.completions.try_iter());
        self.pending.len() - before
    }

    // -----------------------------------------------------------------------
    // Viewport passthroughs
    // -----------------------------------------------------------------------

    pub fn set_zoom_level(&mut self, level: f64) {
        self.viewport.set_zoom_level(level);
        self.touch();
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
        self.touch();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
        self.touch();
    }

    pub fn pan(&mut self, delta_px: f64) {
        self.viewport.pan(delta_px);
        self.touch();
    }

    pub fn center_on(&mut self, instant: DateTime<Utc>) {
        self.viewport.center_on(instant);
        self.touch();
    }

    pub fn set_viewport_width(&mut self, width_px: f64) {
        self.viewport.set_viewport_width(width_px);
        self.touch();
    }

    pub fn toggle_cluster(&mut self, id: ClusterId) -> bool {
        let expanded = self.viewport.toggle_cluster(id);
        self.touch();
        expanded
    }

    pub fn select_event(&mut self, id: Option<EventId>) {
        self.viewport.select_event(id);
    }

    pub fn set_focused_date(&mut self, date: Option<DateTime<Utc>>) {
        self.viewport.set_focused_date(date);
    }

    #[must_use]
    pub const fn viewport(&self) -> &ViewportState {
        self.viewport.state()
    }

    /// Snapshot of the tree currently being served.
    #[must_use]
    pub fn tree(&self) -> Arc<ClusterTree> {
        self.tree.load()
    }

    #[must_use]
    pub const fn data_version(&self) -> DataVersion {
        self.data_version
    }

    fn touch(&mut self) {
        self.debounce.note_change(Instant::now());
    }
}
