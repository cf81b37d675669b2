//! Optimistic reorder persistence.
//!
//! [`PersistenceCoordinator`] owns the local flat list. A reorder is applied
//! to it immediately, then written to the [`SessionGate`] after a debounce
//! window; every new reorder restarts the window, so a burst of drag events
//! becomes one write carrying the final order. Writes always send the
//! complete order, which makes a late success from a superseded write
//! harmless. A failed write discards all local changes and reloads the
//! canonical list from the gate.
//!
//! Write outcomes come back as [`SyncEvent`]s on a channel owned by the
//! coordinator; the owner feeds them to [`PersistenceCoordinator::handle_event`]
//! (or calls [`PersistenceCoordinator::settle`]), so the flat list is only
//! ever mutated through `&mut self`.

use secrecy::SecretString;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::categories::{build_tree, CategoryTree, OrderMap, ReorderTarget};
use crate::feed::FeedRecord;
use crate::gate::{validate_record, GateError, SessionGate};

/// Debounce window between the last reorder and the write.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Capacity of the write-outcome channel.
const EVENT_CHANNEL_SIZE: usize = 32;

/// Where the coordinator stands with respect to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Local order matches the last confirmed write or load.
    Idle,
    /// A debounce timer is armed.
    PendingWrite,
    /// A write has been sent and its outcome not yet handled.
    Reconciling,
}

/// Outcome of a debounced write, delivered to the owner.
#[derive(Debug)]
pub enum SyncEvent {
    ReorderSaved { generation: u64, ids: Vec<String> },
    ReorderFailed { generation: u64, error: GateError },
}

pub struct PersistenceCoordinator {
    gate: Arc<dyn SessionGate>,
    secret: Arc<SecretString>,
    window: Duration,
    /// Local flat list, including optimistic changes.
    feeds: Vec<FeedRecord>,
    order_map: OrderMap,
    /// Last order known to be stored: the latest load or confirmed write.
    confirmed: Vec<FeedRecord>,
    timer: Option<JoinHandle<()>>,
    /// Writes sent whose outcome event has not been handled yet.
    in_flight: Arc<AtomicUsize>,
    generation: u64,
    event_tx: mpsc::Sender<SyncEvent>,
    event_rx: mpsc::Receiver<SyncEvent>,
}

impl PersistenceCoordinator {
    pub fn new(gate: Arc<dyn SessionGate>, secret: SecretString) -> Self {
        Self::with_window(gate, secret, DEFAULT_DEBOUNCE)
    }

    pub fn with_window(gate: Arc<dyn SessionGate>, secret: SecretString, window: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        Self {
            gate,
            secret: Arc::new(secret),
            window,
            feeds: Vec::new(),
            order_map: OrderMap::default(),
            confirmed: Vec::new(),
            timer: None,
            in_flight: Arc::new(AtomicUsize::new(0)),
            generation: 0,
            event_tx,
            event_rx,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Local flat list, optimistic changes included.
    pub fn feeds(&self) -> &[FeedRecord] {
        &self.feeds
    }

    /// Last order known to be stored.
    pub fn confirmed(&self) -> &[FeedRecord] {
        &self.confirmed
    }

    pub fn order_map(&self) -> &OrderMap {
        &self.order_map
    }

    /// Tree for display, rebuilt from the local flat list.
    pub fn tree(&self) -> CategoryTree {
        build_tree(&self.feeds)
    }

    pub fn state(&self) -> SyncState {
        if self.timer.as_ref().is_some_and(|timer| !timer.is_finished()) {
            SyncState::PendingWrite
        } else if self.in_flight.load(Ordering::Acquire) > 0 {
            SyncState::Reconciling
        } else {
            SyncState::Idle
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Replace local state with the canonical list.
    pub async fn load(&mut self) -> Result<(), GateError> {
        let feeds = self.gate.list(&self.secret).await?;
        tracing::info!(count = feeds.len(), "Loaded feed list");
        self.replace_feeds(feeds, false);
        Ok(())
    }

    /// Take `feeds` as the stored truth. The order map is rebuilt from the
    /// new tree unless `keep_order_map` is set, in which case entries for
    /// groups that still exist survive.
    fn replace_feeds(&mut self, feeds: Vec<FeedRecord>, keep_order_map: bool) {
        let tree = build_tree(&feeds);
        if keep_order_map {
            self.order_map.retain_existing(&tree);
        } else {
            self.order_map = OrderMap::from_tree(&tree);
        }
        self.confirmed = feeds.clone();
        self.feeds = feeds;
    }

    // ========================================================================
    // Reordering
    // ========================================================================

    /// Reorder the top-level groups by name.
    pub fn reorder_top_level(&mut self, group_order: &[String]) {
        self.on_reorder(&ReorderTarget::TopLevel, group_order);
    }

    /// Reorder the child groups of `parent_path` by name.
    pub fn reorder_children(&mut self, parent_path: &str, child_order: &[String]) {
        self.on_reorder(&ReorderTarget::Children(parent_path.to_owned()), child_order);
    }

    /// Reorder the feeds filed directly under `parent_path` by id.
    pub fn reorder_feeds(&mut self, parent_path: &str, ids: &[String]) {
        self.on_reorder(&ReorderTarget::Feeds(parent_path.to_owned()), ids);
    }

    /// Handle a drag gesture: identifiers of `target`'s items in their new
    /// order. Group gestures also record the sibling order they set.
    ///
    /// Child and feed gestures without a parent path are ignored: they touch
    /// neither the flat list nor the sibling orders, and arm no write.
    pub fn on_reorder(&mut self, target: &ReorderTarget, ids: &[String]) {
        if !target.is_addressable() {
            tracing::warn!(?target, "Reorder gesture without a parent path, ignoring");
            return;
        }
        let next = target.apply(&self.feeds, ids);
        if let Some(parent) = target.order_parent() {
            self.order_map.set(&parent, ids.to_vec());
        }
        self.apply(next);
    }

    /// Apply a new flat order locally and (re)arm the debounce timer.
    fn apply(&mut self, next: Vec<FeedRecord>) {
        self.feeds = next;
        self.arm_timer();
    }

    fn arm_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }

        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let ids: Vec<String> = self.feeds.iter().map(|f| f.id.clone()).collect();
        let deadline = Instant::now() + self.window;

        let gate = Arc::clone(&self.gate);
        let secret = Arc::clone(&self.secret);
        let tx = self.event_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tracing::debug!(generation, window_ms = self.window.as_millis() as u64, "Armed order write");

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            // The write runs as its own task: aborting a superseded timer must
            // never cancel a write that has already started.
            in_flight.fetch_add(1, Ordering::AcqRel);
            tokio::spawn(async move {
                tracing::debug!(generation, count = ids.len(), "Writing feed order");
                let event = match gate.reorder(&ids, &secret).await {
                    Ok(()) => SyncEvent::ReorderSaved { generation, ids },
                    Err(error) => SyncEvent::ReorderFailed { generation, error },
                };
                if let Err(e) = tx.send(event).await {
                    tracing::warn!(error = %e, "Failed to deliver order write outcome (receiver dropped)");
                }
            });
        }));
    }

    // ========================================================================
    // Write Outcomes
    // ========================================================================

    /// Wait for the next write outcome.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.event_rx.recv().await
    }

    /// Apply a write outcome.
    ///
    /// A failure rolls local state back to the canonical list and returns the
    /// write error for display.
    pub async fn handle_event(&mut self, event: SyncEvent) -> Result<(), GateError> {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match event {
            SyncEvent::ReorderSaved { generation, ids } => {
                tracing::debug!(generation, latest = self.generation, "Feed order saved");
                self.confirmed = records_in_order(&self.feeds, &ids);
                Ok(())
            }
            SyncEvent::ReorderFailed { generation, error } => {
                tracing::warn!(generation, error = %error, "Feed order write failed, reloading saved order");
                self.rollback(error).await
            }
        }
    }

    /// Drop every optimistic change and reload the canonical list.
    ///
    /// If the reload fails too, fall back to the last confirmed order.
    async fn rollback(&mut self, error: GateError) -> Result<(), GateError> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            tracing::debug!("Cancelled pending order write during rollback");
        }

        match self.gate.list(&self.secret).await {
            Ok(feeds) => {
                tracing::info!(count = feeds.len(), "Restored saved feed order");
                self.replace_feeds(feeds, false);
                Err(error)
            }
            Err(reload) => {
                tracing::error!(error = %reload, "Reload after failed write also failed, keeping last confirmed order");
                let confirmed = std::mem::take(&mut self.confirmed);
                self.replace_feeds(confirmed, false);
                Err(GateError::Rollback {
                    write: Box::new(error),
                    reload: Box::new(reload),
                })
            }
        }
    }

    /// Process write outcomes until nothing is pending or in flight.
    ///
    /// Returns the first failure seen; state has already been rolled back.
    pub async fn settle(&mut self) -> Result<(), GateError> {
        let mut first_error = None;
        while self.state() != SyncState::Idle {
            let Some(event) = self.event_rx.recv().await else {
                break;
            };
            if let Err(e) = self.handle_event(event).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Write a pending order now instead of waiting out the window, then
    /// settle.
    pub async fn flush(&mut self) -> Result<(), GateError> {
        if let Some(timer) = self.timer.take() {
            if !timer.is_finished() {
                timer.abort();
                let ids: Vec<String> = self.feeds.iter().map(|f| f.id.clone()).collect();
                let generation = self.generation;
                tracing::debug!(generation, count = ids.len(), "Flushing pending order write");

                self.in_flight.fetch_add(1, Ordering::AcqRel);
                let event = match self.gate.reorder(&ids, &self.secret).await {
                    Ok(()) => SyncEvent::ReorderSaved { generation, ids },
                    Err(error) => SyncEvent::ReorderFailed { generation, error },
                };
                self.handle_event(event).await?;
            }
        }
        self.settle().await
    }

    // ========================================================================
    // Record Mutations
    // ========================================================================

    /// Create or update one record, then resynchronize from the store.
    ///
    /// Pending order writes are flushed first so the refresh cannot discard
    /// them. If that flush fails, the list is rolled back, the record is not
    /// sent, and the order write's error is returned. Validation failures
    /// never reach the gate. Transient failures still refresh the list
    /// before being returned.
    pub async fn upsert(&mut self, record: FeedRecord) -> Result<(), GateError> {
        let record = validate_record(record)?;
        self.flush().await?;

        let result = self.gate.upsert(&record, &self.secret).await;
        self.after_mutation("upsert", &record.id, result).await
    }

    /// Remove one record, then resynchronize from the store.
    ///
    /// Like [`upsert`](Self::upsert), a failed flush of a pending order write
    /// returns that error without sending the removal.
    pub async fn remove(&mut self, id: &str) -> Result<(), GateError> {
        if id.trim().is_empty() {
            return Err(GateError::Validation("id is required".into()));
        }
        self.flush().await?;

        let result = self.gate.remove(id, &self.secret).await;
        self.after_mutation("remove", id, result).await
    }

    async fn after_mutation(
        &mut self,
        operation: &'static str,
        id: &str,
        result: Result<(), GateError>,
    ) -> Result<(), GateError> {
        match result {
            Ok(()) => {
                tracing::info!(operation, id, "Feed updated");
                self.refresh().await
            }
            Err(error) if !error.is_transient() => Err(error),
            Err(error) => {
                tracing::warn!(operation, id, error = %error, "Feed update failed, refreshing list");
                if let Err(refresh) = self.refresh().await {
                    tracing::warn!(error = %refresh, "Refresh after failed update also failed");
                }
                Err(error)
            }
        }
    }

    /// Reload the list, keeping explicit group orders that still apply.
    async fn refresh(&mut self) -> Result<(), GateError> {
        let feeds = self.gate.list(&self.secret).await?;
        self.replace_feeds(feeds, true);
        Ok(())
    }
}

impl Drop for PersistenceCoordinator {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            tracing::debug!("Aborted pending order write on coordinator drop");
        }
    }
}

/// Reorder `records` to follow `ids`; records not named keep their order after.
fn records_in_order(records: &[FeedRecord], ids: &[String]) -> Vec<FeedRecord> {
    let mut remaining: Vec<Option<&FeedRecord>> = records.iter().map(Some).collect();
    let mut out = Vec::with_capacity(records.len());
    for id in ids {
        if let Some(slot) = remaining
            .iter_mut()
            .find(|slot| slot.is_some_and(|r| &r.id == id))
        {
            if let Some(record) = slot.take() {
                out.push(record.clone());
            }
        }
    }
    out.extend(remaining.into_iter().flatten().cloned());
    out
}
