//! Order lifecycle manager: the authoritative local mirror.
//!
//! [`OrderBoard`] subscribes to the active-order feed, replaces its
//! working set wholesale on every snapshot (the remote store is the
//! single source of truth), validates and optimistically applies status
//! transitions before persisting them, and refreshes the completed-order
//! cache on an independent timer. Consumers only ever see defensive
//! copies; every mutation routes through [`OrderBoard::request_transition`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::BoardError;
use crate::orders::{now_millis, NewOrder, Order, OrderStatus};
use crate::store::OrderStore;
use crate::sync::{AccessMode, FeedEvent, SubscriptionHandle, SyncAdapter};

/// Default cadence for the completed-orders refresh. Completed orders are
/// not time-sensitive, so they ride a slower timer than the active feed.
pub const DEFAULT_COMPLETED_REFRESH: Duration = Duration::from_secs(5);

/// Connectivity of the board toward the remote store. `Error` is distinct
/// from `Ready` with zero orders: the UI shows a banner for one and an
/// empty board for the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connectivity {
    /// No snapshot and no failure observed yet.
    Loading,
    /// The store cannot be reached; the order views are not authoritative.
    Error(String),
    /// At least one authoritative snapshot has been applied.
    Ready,
}

struct BoardState {
    /// Last authoritative active snapshot, oldest order first. May
    /// briefly hold optimistically advanced copies the store has not
    /// confirmed yet.
    active: Vec<Order>,
    /// Cached result of the last completed-orders fetch, newest first.
    completed: Vec<Order>,
    connectivity: Connectivity,
}

/// The authoritative local mirror of the order collection.
pub struct OrderBoard {
    store: Arc<dyn OrderStore>,
    state: Arc<Mutex<BoardState>>,
    subscription: SubscriptionHandle,
    refresher: CancellationToken,
}

impl OrderBoard {
    /// Start mirroring the store: probes connectivity, subscribes to the
    /// active feed and spawns the completed-orders refresher. A failed
    /// probe enters degraded mode (connectivity `Error`) rather than
    /// aborting; the normal poll/reconnect cadence may recover later.
    /// Must be called from within a Tokio runtime.
    pub async fn start(
        store: Arc<dyn OrderStore>,
        mode: AccessMode,
    ) -> Result<Self, BoardError> {
        Self::start_with_refresh(store, mode, DEFAULT_COMPLETED_REFRESH).await
    }

    pub async fn start_with_refresh(
        store: Arc<dyn OrderStore>,
        mode: AccessMode,
        completed_refresh: Duration,
    ) -> Result<Self, BoardError> {
        let connectivity = match store.probe().await {
            Ok(()) => Connectivity::Loading,
            Err(e) => {
                warn!(error = %e, "store probe failed at startup; entering degraded mode");
                Connectivity::Error(e.to_string())
            }
        };

        let state = Arc::new(Mutex::new(BoardState {
            active: Vec::new(),
            completed: Vec::new(),
            connectivity,
        }));

        let adapter = SyncAdapter::new(Arc::clone(&store), mode);

        let feed_state = Arc::clone(&state);
        let subscription = adapter.subscribe_active(Arc::new(move |event| {
            let mut state = feed_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match event {
                FeedEvent::Snapshot(orders) => {
                    // Full replace: the feed always carries the whole
                    // authoritative set, so repeated or reordered
                    // deliveries cannot corrupt the mirror.
                    state.active = orders;
                    state.connectivity = Connectivity::Ready;
                }
                FeedEvent::Unavailable(message) => {
                    // Keep whatever data we had; only the tag changes.
                    state.connectivity = Connectivity::Error(message);
                }
            }
        }))?;

        let refresher = CancellationToken::new();
        spawn_completed_refresher(
            adapter,
            Arc::clone(&state),
            completed_refresh,
            refresher.clone(),
        );

        Ok(OrderBoard {
            store,
            state,
            subscription,
            refresher,
        })
    }

    fn state_guard(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------
    // Read API
    // -----------------------------------------------------------------

    /// All orders not yet completed, oldest first. Defensive copy; the
    /// caller cannot affect the mirror through it.
    pub fn active_orders(&self) -> Vec<Order> {
        self.state_guard()
            .active
            .iter()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Cached completed orders, most recently completed first.
    pub fn completed_orders(&self) -> Vec<Order> {
        self.state_guard().completed.clone()
    }

    /// Read-time projection over the union of both views; never reorders
    /// or mutates the underlying sets. An order caught mid-handoff
    /// between the two refresh cadences is reported once, from the
    /// fresher active copy.
    pub fn orders_with_status(&self, status: OrderStatus) -> Vec<Order> {
        let state = self.state_guard();
        let mut seen: Vec<&str> = Vec::with_capacity(state.active.len());
        let mut result = Vec::new();
        for order in &state.active {
            seen.push(order.id.as_str());
            if order.status == status {
                result.push(order.clone());
            }
        }
        for order in &state.completed {
            if order.status == status && !seen.contains(&order.id.as_str()) {
                result.push(order.clone());
            }
        }
        result
    }

    pub fn connectivity(&self) -> Connectivity {
        self.state_guard().connectivity.clone()
    }

    // -----------------------------------------------------------------
    // Write API
    // -----------------------------------------------------------------

    /// Create a new order in the store. The mirror picks it up on the
    /// next feed delivery; nothing is applied locally here.
    pub async fn create_order(&self, order: NewOrder) -> Result<String, BoardError> {
        order.validate()?;
        self.store.insert(&order).await
    }

    /// Request a status transition. Valid only when `target` is exactly
    /// one step forward from the order's current status; anything else is
    /// rejected before any network call. On a valid request the local
    /// copy is advanced optimistically so the UI does not wait on the
    /// network, then the change is persisted. A failed persist leaves the
    /// optimistic copy in place; the next authoritative snapshot
    /// reconciles it.
    pub async fn request_transition(
        &self,
        order_id: &str,
        target: OrderStatus,
    ) -> Result<(), BoardError> {
        let (from, updated_at) = {
            let mut state = self.state_guard();

            let Some(idx) = state.active.iter().position(|o| o.id == order_id) else {
                if state.completed.iter().any(|o| o.id == order_id) {
                    // Completed orders are read-only history.
                    return Err(BoardError::InvalidTransition {
                        from: OrderStatus::Completed,
                        to: target,
                    });
                }
                return Err(BoardError::UnknownOrder(order_id.to_string()));
            };

            let order = &mut state.active[idx];
            order.status.validate_transition(target)?;

            let from = order.status;
            // Strictly increasing even when the wall clock stands still
            // within one millisecond.
            let updated_at = now_millis().max(order.updated_at + 1);
            order.status = target;
            order.updated_at = updated_at;
            (from, updated_at)
        };

        if let Err(e) = self.store.patch_status(order_id, target, updated_at).await {
            warn!(
                order_id,
                from = %from,
                to = %target,
                error = %e,
                "status persist failed; local copy is ahead of the store until the next snapshot"
            );
            return Err(BoardError::PersistFailure {
                order_id: order_id.to_string(),
                message: e.to_string(),
            });
        }

        info!(order_id, from = %from, to = %target, "order status advanced");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    /// Stop the feed subscription and the completed-orders refresher.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        self.subscription.unsubscribe();
        self.refresher.cancel();
    }
}

impl Drop for OrderBoard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodic completed-orders refresh, independent of the active feed
/// cadence. Failures keep the cached set: a stale history beats an empty
/// one.
fn spawn_completed_refresher(
    adapter: SyncAdapter,
    state: Arc<Mutex<BoardState>>,
    every: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        info!(
            interval_ms = every.as_millis() as u64,
            "completed-order refresh loop started"
        );
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match adapter.fetch_completed().await {
                Ok(completed) => {
                    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    state.completed = completed;
                }
                Err(e) => {
                    warn!(error = %e, "completed-order refresh failed; keeping cached set");
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(every) => {}
            }
        }
        info!("completed-order refresh loop stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderLine;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const FAST_POLL: Duration = Duration::from_millis(20);
    const FAST_REFRESH: Duration = Duration::from_millis(30);

    fn soup_order(table: u32) -> NewOrder {
        NewOrder::from_lines(
            table,
            vec![OrderLine {
                menu_item_id: None,
                name: "Soup".into(),
                price: 5.0,
                quantity: 2,
                special_instructions: None,
            }],
        )
    }

    async fn wait_until<F: Fn() -> bool>(what: &str, predicate: F) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {what}");
    }

    async fn start_board(store: Arc<dyn OrderStore>) -> OrderBoard {
        OrderBoard::start_with_refresh(
            store,
            AccessMode::Poll {
                interval: FAST_POLL,
            },
            FAST_REFRESH,
        )
        .await
        .expect("board should start")
    }

    /// Store wrapper that counts writes and can fail them on demand.
    struct CountingStore {
        inner: MemoryStore,
        patch_calls: AtomicUsize,
        fail_patches: AtomicBool,
    }

    impl CountingStore {
        fn new() -> Self {
            CountingStore {
                inner: MemoryStore::new(),
                patch_calls: AtomicUsize::new(0),
                fail_patches: AtomicBool::new(false),
            }
        }

        fn patches(&self) -> usize {
            self.patch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl OrderStore for CountingStore {
        async fn insert(&self, order: &NewOrder) -> Result<String, BoardError> {
            self.inner.insert(order).await
        }
        async fn patch_status(
            &self,
            id: &str,
            status: OrderStatus,
            updated_at: i64,
        ) -> Result<(), BoardError> {
            self.patch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_patches.load(Ordering::SeqCst) {
                return Err(BoardError::StoreUnavailable("injected write failure".into()));
            }
            self.inner.patch_status(id, status, updated_at).await
        }
        async fn query_by_status_not_equal(
            &self,
            status: OrderStatus,
        ) -> Result<Vec<Order>, BoardError> {
            self.inner.query_by_status_not_equal(status).await
        }
        async fn query_by_status_equal(
            &self,
            status: OrderStatus,
        ) -> Result<Vec<Order>, BoardError> {
            self.inner.query_by_status_equal(status).await
        }
        async fn probe(&self) -> Result<(), BoardError> {
            self.inner.probe().await
        }
        fn changes(&self) -> Option<tokio::sync::broadcast::Receiver<()>> {
            self.inner.changes()
        }
    }

    /// A store that is down from the start.
    struct UnreachableStore;

    #[async_trait]
    impl OrderStore for UnreachableStore {
        async fn insert(&self, _order: &NewOrder) -> Result<String, BoardError> {
            Err(BoardError::StoreUnavailable("unreachable".into()))
        }
        async fn patch_status(
            &self,
            _id: &str,
            _status: OrderStatus,
            _updated_at: i64,
        ) -> Result<(), BoardError> {
            Err(BoardError::StoreUnavailable("unreachable".into()))
        }
        async fn query_by_status_not_equal(
            &self,
            _status: OrderStatus,
        ) -> Result<Vec<Order>, BoardError> {
            Err(BoardError::StoreUnavailable("unreachable".into()))
        }
        async fn query_by_status_equal(
            &self,
            _status: OrderStatus,
        ) -> Result<Vec<Order>, BoardError> {
            Err(BoardError::StoreUnavailable("unreachable".into()))
        }
        async fn probe(&self) -> Result<(), BoardError> {
            Err(BoardError::StoreUnavailable("unreachable".into()))
        }
    }

    #[tokio::test]
    async fn full_lifecycle_walks_the_pipeline() {
        let store = Arc::new(CountingStore::new());
        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;

        let id = board.create_order(soup_order(4)).await.expect("create");
        wait_until("order on the board", || !board.active_orders().is_empty()).await;

        let created = board.active_orders()[0].clone();
        assert_eq!(created.status, OrderStatus::Pending);
        assert_eq!(created.total_amount, 10.0);

        board
            .request_transition(&id, OrderStatus::Preparing)
            .await
            .expect("pending -> preparing");
        let after = board.active_orders()[0].clone();
        assert_eq!(after.status, OrderStatus::Preparing);
        assert!(
            after.updated_at > created.updated_at,
            "updatedAt must increase on transition"
        );

        // Skip ahead: rejected, nothing changes.
        let err = board
            .request_transition(&id, OrderStatus::Serving)
            .await
            .expect_err("skip transition must fail");
        assert!(matches!(err, BoardError::InvalidTransition { .. }));
        assert_eq!(board.active_orders()[0].status, OrderStatus::Preparing);

        board
            .request_transition(&id, OrderStatus::Ready)
            .await
            .expect("preparing -> ready");
        board
            .request_transition(&id, OrderStatus::Serving)
            .await
            .expect("ready -> serving");
        board
            .request_transition(&id, OrderStatus::Completed)
            .await
            .expect("serving -> completed");

        // Completed orders leave the active view and show up in the
        // completed view after its next refresh.
        wait_until("active view drains", || board.active_orders().is_empty()).await;
        wait_until("completed view fills", || {
            board.completed_orders().iter().any(|o| o.id == id)
        })
        .await;
        board.shutdown();
    }

    #[tokio::test]
    async fn invalid_transition_makes_no_store_write() {
        let store = Arc::new(CountingStore::new());
        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;

        let id = board.create_order(soup_order(1)).await.expect("create");
        wait_until("order on the board", || !board.active_orders().is_empty()).await;

        for target in [
            OrderStatus::Pending,
            OrderStatus::Ready,
            OrderStatus::Serving,
            OrderStatus::Completed,
        ] {
            let err = board
                .request_transition(&id, target)
                .await
                .expect_err("non-adjacent target must fail");
            assert!(matches!(err, BoardError::InvalidTransition { .. }));
        }
        assert_eq!(store.patches(), 0, "rejected transitions must not hit the store");
        assert_eq!(board.active_orders()[0].status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_transition_writes_exactly_once() {
        let store = Arc::new(CountingStore::new());
        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;

        let id = board.create_order(soup_order(1)).await.expect("create");
        wait_until("order on the board", || !board.active_orders().is_empty()).await;

        board
            .request_transition(&id, OrderStatus::Preparing)
            .await
            .expect("first request lands");
        // Second click on the same button: the local copy is already in
        // `preparing`, so this is a same-state request and a no-op.
        let err = board
            .request_transition(&id, OrderStatus::Preparing)
            .await
            .expect_err("duplicate must be rejected");
        assert!(matches!(err, BoardError::InvalidTransition { .. }));
        assert_eq!(store.patches(), 1, "exactly one store write for the pair");
    }

    #[tokio::test]
    async fn unknown_order_is_rejected_locally() {
        let store = Arc::new(CountingStore::new());
        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;

        let err = board
            .request_transition("no-such-order", OrderStatus::Preparing)
            .await
            .expect_err("unknown id must fail");
        assert!(matches!(err, BoardError::UnknownOrder(_)));
        assert_eq!(store.patches(), 0);
    }

    #[tokio::test]
    async fn views_partition_by_terminal_status() {
        let store = Arc::new(MemoryStore::new());
        for (id, status, created_at) in [
            ("a", OrderStatus::Pending, 300),
            ("b", OrderStatus::Serving, 100),
            ("c", OrderStatus::Completed, 200),
        ] {
            let mut order = soup_order(1).into_order(id.to_string());
            order.status = status;
            order.created_at = created_at;
            order.updated_at = created_at;
            store.seed(order);
        }

        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;
        wait_until("views settle", || {
            board.active_orders().len() == 2 && board.completed_orders().len() == 1
        })
        .await;

        // Active is FIFO by creation regardless of delivery order.
        let active_ids: Vec<String> = board.active_orders().iter().map(|o| o.id.clone()).collect();
        assert_eq!(active_ids, vec!["b", "a"]);
        assert!(board
            .active_orders()
            .iter()
            .all(|o| o.status != OrderStatus::Completed));
        assert!(board
            .completed_orders()
            .iter()
            .all(|o| o.status == OrderStatus::Completed));

        // Status projection unions both views without duplicates.
        assert_eq!(board.orders_with_status(OrderStatus::Serving).len(), 1);
        assert_eq!(board.orders_with_status(OrderStatus::Completed).len(), 1);
        assert!(board.orders_with_status(OrderStatus::Ready).is_empty());
    }

    #[tokio::test]
    async fn startup_failure_is_error_not_empty() {
        let board = start_board(Arc::new(UnreachableStore)).await;

        assert!(
            matches!(board.connectivity(), Connectivity::Error(_)),
            "probe failure must surface as an error state"
        );
        assert!(board.active_orders().is_empty());

        // Contrast: a reachable store with zero orders is Ready.
        let empty = start_board(Arc::new(MemoryStore::new())).await;
        wait_until("ready state", || empty.connectivity() == Connectivity::Ready).await;
        assert!(empty.active_orders().is_empty());
    }

    #[tokio::test]
    async fn failed_persist_keeps_optimistic_copy_until_snapshot() {
        let store = Arc::new(CountingStore::new());
        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;

        let id = board.create_order(soup_order(2)).await.expect("create");
        wait_until("order on the board", || !board.active_orders().is_empty()).await;

        store.fail_patches.store(true, Ordering::SeqCst);
        let err = board
            .request_transition(&id, OrderStatus::Preparing)
            .await
            .expect_err("persist failure must surface");
        assert!(matches!(err, BoardError::PersistFailure { .. }));

        // Optimistic copy is left in place...
        assert_eq!(board.active_orders()[0].status, OrderStatus::Preparing);

        // ...until the next authoritative snapshot walks it back to the
        // store's value. Unchanged polls are deduplicated, so the next
        // snapshot arrives with the next remote change; here, another
        // admin creating an order.
        store.fail_patches.store(false, Ordering::SeqCst);
        store.inner.insert(&soup_order(8)).await.expect("insert");
        wait_until("snapshot reconciles the mirror", || {
            board
                .active_orders()
                .iter()
                .any(|o| o.id == id && o.status == OrderStatus::Pending)
        })
        .await;
    }

    #[tokio::test]
    async fn shutdown_stops_mirroring_and_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let board = start_board(Arc::clone(&store) as Arc<dyn OrderStore>).await;
        wait_until("ready state", || board.connectivity() == Connectivity::Ready).await;

        board.shutdown();
        board.shutdown();

        store.insert(&soup_order(9)).await.expect("insert");
        tokio::time::sleep(FAST_POLL * 5).await;
        assert!(
            board.active_orders().is_empty(),
            "no feed deliveries after shutdown"
        );
    }
}
