//! Sync adapter: one normalized change feed over two store access modes.
//!
//! Poll mode refetches the active set on a fixed cadence and diffs it
//! locally; push mode refetches whenever the store signals a change.
//! Either way the subscriber always receives the authoritative full
//! active set (never a partial patch), de-duplicated by an
//! `(id, updatedAt)` fingerprint so unchanged refreshes do not re-render.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BoardError;
use crate::orders::{sort_active, sort_completed, Order, OrderStatus};
use crate::store::OrderStore;

/// Default poll cadence for the active set: the minimum acceptable
/// refresh latency for a board that presents itself as realtime.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// How the adapter learns about remote changes. Chosen at construction;
/// subscribers never see the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Re-fetch the active set on a fixed cadence and diff locally.
    Poll { interval: Duration },
    /// Re-fetch when the store's change channel fires. Requires the
    /// store's push capability.
    Push,
}

impl AccessMode {
    /// Poll mode at the default cadence.
    pub fn poll() -> Self {
        AccessMode::Poll {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One delivery from the adapter.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Authoritative full active set, oldest order first.
    Snapshot(Vec<Order>),
    /// The store cannot be reached. Distinct from an empty set so
    /// consumers can tell "zero orders" from "cannot connect".
    Unavailable(String),
}

/// Subscriber callback. Invoked from the adapter's background task.
pub type FeedCallback = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// Handle for an active subscription. Unsubscribing is idempotent and
/// stops delivery and timers immediately; dropping the handle
/// unsubscribes too.
pub struct SubscriptionHandle {
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Bridges one [`OrderStore`] into the normalized feed contract.
pub struct SyncAdapter {
    store: Arc<dyn OrderStore>,
    mode: AccessMode,
}

impl SyncAdapter {
    pub fn new(store: Arc<dyn OrderStore>, mode: AccessMode) -> Self {
        SyncAdapter { store, mode }
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Subscribe to the active (non-completed) set. The callback fires
    /// with the current set as soon as it is known, then on every remote
    /// change. Must be called from within a Tokio runtime.
    pub fn subscribe_active(
        &self,
        callback: FeedCallback,
    ) -> Result<SubscriptionHandle, BoardError> {
        let cancel = CancellationToken::new();
        match self.mode {
            AccessMode::Poll { interval } => {
                spawn_poll_loop(Arc::clone(&self.store), interval, callback, cancel.clone());
            }
            AccessMode::Push => {
                let rx = self.store.changes().ok_or_else(|| {
                    BoardError::StoreUnavailable(
                        "store has no change channel; use poll mode".into(),
                    )
                })?;
                spawn_push_loop(Arc::clone(&self.store), rx, callback, cancel.clone());
            }
        }
        Ok(SubscriptionHandle { cancel })
    }

    /// Point-in-time fetch of the completed set, most recently completed
    /// first.
    pub async fn fetch_completed(&self) -> Result<Vec<Order>, BoardError> {
        let mut orders = self
            .store
            .query_by_status_equal(OrderStatus::Completed)
            .await?;
        sort_completed(&mut orders);
        Ok(orders)
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Cheap change detector: id plus updatedAt, over the sorted set. Deep
/// comparison of the full documents is never needed because a status
/// write always rewrites `updatedAt`.
fn fingerprint(orders: &[Order]) -> Vec<(String, i64)> {
    orders
        .iter()
        .map(|o| (o.id.clone(), o.updated_at))
        .collect()
}

/// Shared per-subscription refresh: fetch the active set, diff it against
/// the last delivery, and invoke the callback when something changed.
/// Unavailability is delivered on the edge only; a persistent outage is
/// one event, not one per tick.
async fn deliver_active(
    store: &Arc<dyn OrderStore>,
    callback: &FeedCallback,
    last: &mut Option<Vec<(String, i64)>>,
    was_available: &mut Option<bool>,
) {
    match store.query_by_status_not_equal(OrderStatus::Completed).await {
        Ok(mut orders) => {
            sort_active(&mut orders);
            let print = fingerprint(&orders);
            // First success and offline->online recovery always deliver,
            // even when the fingerprint matches the last delivery.
            let force = !matches!(was_available, Some(true));
            let changed = last.as_ref() != Some(&print);

            if *was_available == Some(false) {
                info!("order store reachable again");
            }
            *was_available = Some(true);

            if changed || force {
                *last = Some(print);
                callback(FeedEvent::Snapshot(orders));
            } else {
                debug!("active set unchanged; skipping delivery");
            }
        }
        Err(e) => {
            let message = e.to_string();
            if *was_available != Some(false) {
                warn!(error = %message, "active-order refresh failed");
                callback(FeedEvent::Unavailable(message));
            }
            *was_available = Some(false);
        }
    }
}

fn spawn_poll_loop(
    store: Arc<dyn OrderStore>,
    interval: Duration,
    callback: FeedCallback,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        info!(
            interval_ms = interval.as_millis() as u64,
            "active-order poll loop started"
        );
        let mut last: Option<Vec<(String, i64)>> = None;
        let mut was_available: Option<bool> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            deliver_active(&store, &callback, &mut last, &mut was_available).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("active-order poll loop stopped");
    });
}

fn spawn_push_loop(
    store: Arc<dyn OrderStore>,
    mut rx: broadcast::Receiver<()>,
    callback: FeedCallback,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        info!("active-order push loop started");
        let mut last: Option<Vec<(String, i64)>> = None;
        let mut was_available: Option<bool> = None;

        // Initial delivery: the current set, as soon as it is known.
        deliver_active(&store, &callback, &mut last, &mut was_available).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(()) => {
                        deliver_active(&store, &callback, &mut last, &mut was_available).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed signals collapse into one refetch; the
                        // feed carries full snapshots, not deltas.
                        debug!(skipped, "change channel lagged; refetching");
                        deliver_active(&store, &callback, &mut last, &mut was_available).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("store change channel closed");
                        callback(FeedEvent::Unavailable(
                            "store change channel closed".into(),
                        ));
                        break;
                    }
                }
            }
        }
        info!("active-order push loop stopped");
    });
}
