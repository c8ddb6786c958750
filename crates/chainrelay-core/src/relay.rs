//! The relay loop: polls every tracked event kind in rotation, fans each
//! occurrence out to subscribers, counts it, and archives the counts once per
//! flush window.
//!
//! # One rotation step (per event kind)
//! 1. Make sure the kind has an installed filter (reinstall if the node lost it).
//!    The install shares the poll timeout.
//! 2. Poll the filter, bounded by `poll_timeout`.
//! 3. For each occurrence, in source order: broadcast → buffer push → mark seen.
//! 4. If the flush window has elapsed: drain the buffer, write one archive
//!    record per nonzero kind, reset the window.
//!
//! Source failures skip the step; the kind is polled again on the next
//! rotation. Archive failures park the record and retry it at the next flush.

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::archive::Archive;
use crate::buffer::EventBuffer;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::source::{EventSource, FilterHandle};
use crate::subscriber::SubscriberChannel;
use crate::types::{ArchiveRecord, EventKind, EventOccurrence};

/// The collaborators a relay loop drives. Passed in explicitly; the loop owns
/// no process-wide state.
#[derive(Clone)]
pub struct RelayContext {
    pub source: Arc<dyn EventSource>,
    pub buffer: Arc<dyn EventBuffer>,
    pub archive: Arc<dyn Archive>,
    pub channel: Arc<dyn SubscriberChannel>,
}

/// Runtime state of the relay loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayState {
    /// Between rotations (or not yet started).
    Idle,
    /// Polling the tracked kinds.
    PollingCycle,
    /// Cancellation received; final flush in progress.
    Stopping,
    /// Terminated.
    Stopped,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::PollingCycle => write!(f, "polling"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Metrics snapshot for the relay loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayMetrics {
    pub cycles: u64,
    pub occurrences_relayed: u64,
    pub source_errors: u64,
    pub delivery_failures: u64,
    pub flushes: u64,
    pub records_archived: u64,
    pub archive_failures: u64,
    pub pending_records: usize,
}

/// Read-only view of a running loop's state and metrics.
#[derive(Clone)]
pub struct RelayMonitor {
    state: Arc<Mutex<RelayState>>,
    metrics: Arc<Mutex<RelayMetrics>>,
}

impl RelayMonitor {
    pub fn state(&self) -> RelayState {
        *self.state.lock().unwrap()
    }

    pub fn metrics(&self) -> RelayMetrics {
        self.metrics.lock().unwrap().clone()
    }
}

pub struct RelayLoop {
    config: RelayConfig,
    ctx: RelayContext,
    /// One slot per tracked kind, in rotation order. `None` = needs (re)install.
    filters: IndexMap<EventKind, Option<FilterHandle>>,
    /// Kinds observed since the last flush.
    seen: HashSet<EventKind>,
    last_flush: Instant,
    /// Records whose archive write failed, oldest first.
    pending: VecDeque<ArchiveRecord>,
    state: Arc<Mutex<RelayState>>,
    metrics: Arc<Mutex<RelayMetrics>>,
}

impl RelayLoop {
    pub fn new(config: RelayConfig, ctx: RelayContext) -> Self {
        let filters = config
            .tracked_event_kinds
            .iter()
            .map(|k| (k.clone(), None))
            .collect();
        Self {
            filters,
            seen: HashSet::new(),
            last_flush: Instant::now(),
            pending: VecDeque::new(),
            state: Arc::new(Mutex::new(RelayState::Idle)),
            metrics: Arc::new(Mutex::new(RelayMetrics::default())),
            config,
            ctx,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn state(&self) -> RelayState {
        *self.state.lock().unwrap()
    }

    pub fn metrics(&self) -> RelayMetrics {
        self.metrics.lock().unwrap().clone()
    }

    pub fn monitor(&self) -> RelayMonitor {
        RelayMonitor {
            state: Arc::clone(&self.state),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Kinds seen since the last flush.
    pub fn seen_kinds(&self) -> &HashSet<EventKind> {
        &self.seen
    }

    fn set_state(&self, state: RelayState) {
        *self.state.lock().unwrap() = state;
    }

    /// Install a filter for every tracked kind that lacks one. Failures are
    /// logged and retried lazily on the kind's next rotation step.
    pub async fn open_filters(&mut self) {
        let kinds: Vec<EventKind> = self.filters.keys().cloned().collect();
        for kind in kinds {
            if let Err(e) = self.ensure_filter(&kind).await {
                warn!(kind = %kind, error = %e, "could not install filter, will retry");
                self.metrics.lock().unwrap().source_errors += 1;
            }
        }
    }

    async fn ensure_filter(&mut self, kind: &EventKind) -> Result<FilterHandle, RelayError> {
        if let Some(Some(handle)) = self.filters.get(kind) {
            return Ok(handle.clone());
        }
        let timeout = self.config.poll_timeout();
        let handle = tokio::time::timeout(timeout, self.ctx.source.open_filter(kind, self.config.from))
            .await
            .map_err(|_| RelayError::Timeout {
                ms: timeout.as_millis() as u64,
            })??;
        debug!(kind = %kind, filter = %handle.id, "filter installed");
        self.filters.insert(kind.clone(), Some(handle.clone()));
        Ok(handle)
    }

    /// Poll one kind and relay whatever it yields. Returns the number of
    /// occurrences relayed.
    pub async fn poll_kind(&mut self, kind: &EventKind) -> Result<usize, RelayError> {
        let handle = self.ensure_filter(kind).await?;

        let timeout = self.config.poll_timeout();
        let polled = match tokio::time::timeout(timeout, self.ctx.source.poll(&handle)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        };

        let occurrences = match polled {
            Ok(occurrences) => occurrences,
            Err(e) => {
                if e.is_filter_lost() {
                    self.filters.insert(kind.clone(), None);
                }
                return Err(e);
            }
        };

        let count = occurrences.len();
        for occurrence in occurrences {
            self.relay(occurrence);
        }
        Ok(count)
    }

    fn relay(&mut self, occurrence: EventOccurrence) {
        // Failed deliveries are logged by the channel; only counted here.
        let report = self.ctx.channel.broadcast(&occurrence.to_message());

        self.ctx.buffer.push(&occurrence.kind);

        if self.seen.insert(occurrence.kind.clone()) {
            debug!(kind = %occurrence.kind, "new event kind since last flush");
        }

        let mut metrics = self.metrics.lock().unwrap();
        metrics.occurrences_relayed += 1;
        metrics.delivery_failures += report.failures.len() as u64;
    }

    /// One rotation step for `kind`: poll, relay, then flush if the window is over.
    pub async fn step(&mut self, kind: &EventKind) {
        match self.poll_kind(kind).await {
            Ok(0) => {}
            Ok(n) => debug!(kind = %kind, relayed = n, "occurrences relayed"),
            Err(e) => {
                warn!(kind = %kind, error = %e, "event source degraded, skipping kind this rotation");
                self.metrics.lock().unwrap().source_errors += 1;
            }
        }

        if self.flush_due() {
            self.flush().await;
        }
    }

    /// Run one full rotation over every tracked kind without pacing.
    pub async fn run_cycle(&mut self) {
        self.set_state(RelayState::PollingCycle);
        let kinds: Vec<EventKind> = self.filters.keys().cloned().collect();
        for kind in &kinds {
            self.step(kind).await;
        }
        self.metrics.lock().unwrap().cycles += 1;
        self.set_state(RelayState::Idle);
    }

    /// Returns `true` once the current flush window has elapsed.
    pub fn flush_due(&self) -> bool {
        self.last_flush.elapsed() >= self.config.flush_window()
    }

    /// Drain the buffer into the archive and start a new window.
    ///
    /// Returns the number of records written by this flush (retried pending
    /// records included).
    pub async fn flush(&mut self) -> usize {
        let mut written = self.retry_pending().await;

        let drained = self.ctx.buffer.drain_all();
        debug!(seen = ?self.seen, kinds = drained.len(), "flushing buffered counts");
        self.seen.clear();
        self.last_flush = Instant::now();

        let timestamp = Utc::now();
        for (kind, times) in drained {
            let record = ArchiveRecord::new(kind, times, timestamp);
            match self.ctx.archive.record(&record).await {
                Ok(()) => {
                    info!(kind = %record.kind, times = record.times, "window archived");
                    written += 1;
                    self.metrics.lock().unwrap().records_archived += 1;
                }
                Err(e) => {
                    error!(kind = %record.kind, times = record.times, error = %e, "archive write failed, record parked for retry");
                    self.metrics.lock().unwrap().archive_failures += 1;
                    self.park(record);
                }
            }
        }

        let mut metrics = self.metrics.lock().unwrap();
        metrics.flushes += 1;
        metrics.pending_records = self.pending.len();
        written
    }

    async fn retry_pending(&mut self) -> usize {
        let mut written = 0;
        let mut still_pending = VecDeque::new();
        while let Some(record) = self.pending.pop_front() {
            match self.ctx.archive.record(&record).await {
                Ok(()) => {
                    info!(kind = %record.kind, times = record.times, "pending record archived");
                    written += 1;
                    self.metrics.lock().unwrap().records_archived += 1;
                }
                Err(e) => {
                    warn!(kind = %record.kind, error = %e, "pending record still failing");
                    self.metrics.lock().unwrap().archive_failures += 1;
                    still_pending.push_back(record);
                }
            }
        }
        self.pending = still_pending;
        written
    }

    fn park(&mut self, record: ArchiveRecord) {
        self.pending.push_back(record);
        while self.pending.len() > self.config.max_pending_records {
            if let Some(dropped) = self.pending.pop_front() {
                error!(
                    kind = %dropped.kind,
                    times = dropped.times,
                    "pending archive queue full, dropping oldest record"
                );
            }
        }
    }

    /// Records waiting for an archive retry.
    pub fn pending_records(&self) -> impl Iterator<Item = &ArchiveRecord> {
        self.pending.iter()
    }

    /// Run until `cancel` fires, then flush what is buffered and release filters.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            kinds = self.filters.len(),
            flush_window_s = self.config.flush_window_seconds,
            "relay loop starting"
        );
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = self.open_filters() => {}
        }

        let delay = self.config.poll_delay();
        let kinds: Vec<EventKind> = self.filters.keys().cloned().collect();

        'rotation: while !cancel.is_cancelled() {
            self.set_state(RelayState::PollingCycle);
            for kind in &kinds {
                tokio::select! {
                    _ = cancel.cancelled() => break 'rotation,
                    _ = tokio::time::sleep(delay) => {}
                }
                self.step(kind).await;
            }
            self.metrics.lock().unwrap().cycles += 1;
            self.set_state(RelayState::Idle);
        }

        self.set_state(RelayState::Stopping);
        info!("relay loop stopping, flushing buffered counts");
        self.flush().await;

        for handle in self.filters.values().flatten() {
            if let Err(e) = self.ctx.source.uninstall_filter(handle).await {
                debug!(kind = %handle.kind, error = %e, "filter uninstall failed");
            }
        }

        self.set_state(RelayState::Stopped);
        info!(metrics = ?self.metrics(), "relay loop stopped");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
