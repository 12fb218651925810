//! Remote order store backends.
//!
//! [`OrderStore`] is the seam between the sync machinery and whatever
//! database actually holds the orders. Two backends ship: [`RestStore`]
//! talks to the remote database over its REST surface (snapshot fetch
//! only, so it pairs with poll mode), and [`MemoryStore`] keeps documents
//! in-process and broadcasts a change signal on every write (push mode).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::api::StoreClient;
use crate::error::BoardError;
use crate::orders::{NewOrder, Order, OrderStatus};

/// Path of the orders collection under the database root.
pub const ORDERS_PATH: &str = "orders";

/// Capacity of the in-process change channel. A lagged receiver simply
/// refetches, so the buffer only needs to absorb short bursts.
const CHANGE_CHANNEL_CAPACITY: usize = 32;

/// The order store contract the sync adapter consumes. All I/O is async;
/// `changes` is the optional push capability.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order document; returns the store-assigned id.
    async fn insert(&self, order: &NewOrder) -> Result<String, BoardError>;

    /// Patch one order's status and `updatedAt` fields.
    async fn patch_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: i64,
    ) -> Result<(), BoardError>;

    async fn query_by_status_not_equal(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<Order>, BoardError>;

    async fn query_by_status_equal(&self, status: OrderStatus) -> Result<Vec<Order>, BoardError>;

    /// Lightweight connectivity check.
    async fn probe(&self) -> Result<(), BoardError>;

    /// Change-notification channel, when the backend can push. `None`
    /// means the caller must poll.
    fn changes(&self) -> Option<broadcast::Receiver<()>> {
        None
    }
}

// ---------------------------------------------------------------------------
// Snapshot decoding
// ---------------------------------------------------------------------------

/// Decode a collection snapshot: an object keyed by document id, or null
/// for an empty collection. Malformed documents are skipped with a
/// warning rather than poisoning the whole snapshot.
pub fn decode_snapshot(snapshot: Value) -> Result<Vec<Order>, BoardError> {
    match snapshot {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => {
            let mut orders = Vec::with_capacity(map.len());
            for (id, doc) in map {
                match Order::from_document(&id, doc) {
                    Ok(order) => orders.push(order),
                    Err(e) => warn!(order_id = %id, error = %e, "skipping malformed order document"),
                }
            }
            Ok(orders)
        }
        other => Err(BoardError::FetchFailure(format!(
            "unexpected snapshot shape: {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// REST backend
// ---------------------------------------------------------------------------

/// Remote store over the REST dialect. The dialect has no server-side
/// inequality filter, so status queries fetch the collection snapshot and
/// filter client-side.
pub struct RestStore {
    client: StoreClient,
}

impl RestStore {
    pub fn new(client: StoreClient) -> Self {
        RestStore { client }
    }

    async fn fetch_all(&self) -> Result<Vec<Order>, BoardError> {
        let snapshot = self.client.get(ORDERS_PATH).await?;
        decode_snapshot(snapshot)
    }
}

#[async_trait]
impl OrderStore for RestStore {
    async fn insert(&self, order: &NewOrder) -> Result<String, BoardError> {
        let doc = serde_json::to_value(order)
            .map_err(|e| BoardError::Validation(format!("unserializable order: {e}")))?;
        let resp = self.client.post(ORDERS_PATH, &doc).await?;
        resp.get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                BoardError::StoreUnavailable("store did not return an id for the new order".into())
            })
    }

    async fn patch_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: i64,
    ) -> Result<(), BoardError> {
        let path = format!("{ORDERS_PATH}/{id}");
        let fields = json!({ "status": status, "updatedAt": updated_at });
        self.client.patch(&path, &fields).await.map(|_| ())
    }

    async fn query_by_status_not_equal(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<Order>, BoardError> {
        let mut orders = self.fetch_all().await?;
        orders.retain(|o| o.status != status);
        Ok(orders)
    }

    async fn query_by_status_equal(&self, status: OrderStatus) -> Result<Vec<Order>, BoardError> {
        let mut orders = self.fetch_all().await?;
        orders.retain(|o| o.status == status);
        Ok(orders)
    }

    async fn probe(&self) -> Result<(), BoardError> {
        let result = self.client.test_connectivity().await;
        if result.success {
            Ok(())
        } else {
            Err(BoardError::StoreUnavailable(
                result
                    .error
                    .unwrap_or_else(|| "connectivity probe failed".into()),
            ))
        }
    }
}

// ---------------------------------------------------------------------------
// In-process backend
// ---------------------------------------------------------------------------

/// In-process store with push notification. Used by the test suites and
/// by embedders that want the full board behavior without a remote
/// database.
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Order>>,
    changes: broadcast::Sender<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MemoryStore {
            documents: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Insert an order with a known id, bypassing id generation. Notifies
    /// subscribers like any other write.
    pub fn seed(&self, order: Order) {
        self.documents_guard().insert(order.id.clone(), order);
        self.notify();
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.documents_guard().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents_guard().is_empty()
    }

    fn documents_guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, Order>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        // No receivers is fine; poll-mode consumers never subscribe.
        let _ = self.changes.send(());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &NewOrder) -> Result<String, BoardError> {
        let id = Uuid::new_v4().to_string();
        let order = order.clone().into_order(id.clone());
        self.documents_guard().insert(id.clone(), order);
        self.notify();
        Ok(id)
    }

    async fn patch_status(
        &self,
        id: &str,
        status: OrderStatus,
        updated_at: i64,
    ) -> Result<(), BoardError> {
        {
            let mut documents = self.documents_guard();
            let order = documents
                .get_mut(id)
                .ok_or_else(|| BoardError::UnknownOrder(id.to_string()))?;
            order.status = status;
            order.updated_at = updated_at;
        }
        self.notify();
        Ok(())
    }

    async fn query_by_status_not_equal(
        &self,
        status: OrderStatus,
    ) -> Result<Vec<Order>, BoardError> {
        Ok(self
            .documents_guard()
            .values()
            .filter(|o| o.status != status)
            .cloned()
            .collect())
    }

    async fn query_by_status_equal(&self, status: OrderStatus) -> Result<Vec<Order>, BoardError> {
        Ok(self
            .documents_guard()
            .values()
            .filter(|o| o.status == status)
            .cloned()
            .collect())
    }

    async fn probe(&self) -> Result<(), BoardError> {
        Ok(())
    }

    fn changes(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }
}
