//! Order model and status pipeline.
//!
//! Wire shapes mirror the store documents the admin dashboard already
//! holds: camelCase field names, epoch-millisecond timestamps, and line
//! items that snapshot the menu at creation time. The status pipeline is
//! strictly linear; every transition moves exactly one step forward.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BoardError;

/// Current wall-clock time as epoch milliseconds, the store's timestamp
/// unit.
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ---------------------------------------------------------------------------
// Status pipeline
// ---------------------------------------------------------------------------

/// Order status. Linear pipeline, no branching, no skips:
/// `pending -> preparing -> ready -> serving -> completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    /// Legacy documents used `served` for the post-ready state; those
    /// still deserialize here so in-flight legacy orders stay on the
    /// board. Serialization always emits `serving`.
    #[serde(alias = "served")]
    Serving,
    Completed,
}

impl OrderStatus {
    /// The full pipeline, in order.
    pub const PIPELINE: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Serving,
        OrderStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Serving => "serving",
            OrderStatus::Completed => "completed",
        }
    }

    /// The next status in the pipeline, or `None` from the terminal state.
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Pending => Some(OrderStatus::Preparing),
            OrderStatus::Preparing => Some(OrderStatus::Ready),
            OrderStatus::Ready => Some(OrderStatus::Serving),
            OrderStatus::Serving => Some(OrderStatus::Completed),
            OrderStatus::Completed => None,
        }
    }

    /// Completed orders are read-only history.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// A transition is valid only when `target` is exactly one step
    /// forward. Same-state, backward and skip requests are all rejected.
    pub fn validate_transition(self, target: OrderStatus) -> Result<(), BoardError> {
        if self.next() == Some(target) {
            Ok(())
        } else {
            Err(BoardError::InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order documents
// ---------------------------------------------------------------------------

/// One line of an order: a snapshot of the menu item at creation time.
/// Menu edits after the fact never rewrite existing lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_item_id: Option<String>,
    pub name: String,
    #[serde(alias = "unitPrice")]
    pub price: f64,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "note")]
    pub special_instructions: Option<String>,
}

impl OrderLine {
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// An order as held in the store, id included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub table_number: u32,
    #[serde(default)]
    pub items: Vec<OrderLine>,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Decode a store document. The store keys documents by id, so the id
    /// travels outside the document body and is injected here.
    pub fn from_document(id: &str, mut doc: Value) -> Result<Order, BoardError> {
        let obj = doc.as_object_mut().ok_or_else(|| {
            BoardError::FetchFailure(format!("order document {id} is not an object"))
        })?;
        obj.insert("id".to_string(), Value::String(id.to_string()));
        serde_json::from_value(doc)
            .map_err(|e| BoardError::FetchFailure(format!("malformed order document {id}: {e}")))
    }
}

/// Payload for creating an order; the store assigns the id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub table_number: u32,
    pub items: Vec<OrderLine>,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NewOrder {
    /// Build a pending order from line snapshots. The total and both
    /// timestamps are fixed here and never recomputed.
    pub fn from_lines(table_number: u32, items: Vec<OrderLine>) -> Self {
        let now = now_millis();
        let total_amount = items.iter().map(OrderLine::line_total).sum();
        NewOrder {
            table_number,
            items,
            status: OrderStatus::Pending,
            total_amount,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), BoardError> {
        if self.table_number == 0 {
            return Err(BoardError::Validation(
                "tableNumber must be a positive integer".into(),
            ));
        }
        if self.items.is_empty() {
            return Err(BoardError::Validation("order has no items".into()));
        }
        for line in &self.items {
            if line.name.trim().is_empty() {
                return Err(BoardError::Validation("order line is missing a name".into()));
            }
            if line.quantity == 0 {
                return Err(BoardError::Validation(format!(
                    "order line {:?} has zero quantity",
                    line.name
                )));
            }
            if !line.price.is_finite() || line.price < 0.0 {
                return Err(BoardError::Validation(format!(
                    "order line {:?} has an invalid price",
                    line.name
                )));
            }
        }
        Ok(())
    }

    /// Attach the store-assigned id.
    pub fn into_order(self, id: String) -> Order {
        Order {
            id,
            table_number: self.table_number,
            items: self.items,
            status: self.status,
            total_amount: self.total_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Sort orders for the two views
// ---------------------------------------------------------------------------

/// Oldest order first: FIFO fairness for the kitchen board. Ties break on
/// id so repeated sorts are stable across deliveries.
pub(crate) fn sort_active(orders: &mut [Order]) {
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Most recently completed first.
pub(crate) fn sort_completed(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(name: &str, price: f64, quantity: u32) -> OrderLine {
        OrderLine {
            menu_item_id: None,
            name: name.to_string(),
            price,
            quantity,
            special_instructions: None,
        }
    }

    #[test]
    fn pipeline_advances_one_step_at_a_time() {
        for pair in OrderStatus::PIPELINE.windows(2) {
            assert_eq!(pair[0].next(), Some(pair[1]));
            pair[0]
                .validate_transition(pair[1])
                .expect("one-step-forward transition should be valid");
        }
        assert_eq!(OrderStatus::Completed.next(), None);
    }

    #[test]
    fn same_state_backward_and_skip_are_rejected() {
        let cases = [
            (OrderStatus::Preparing, OrderStatus::Preparing),
            (OrderStatus::Ready, OrderStatus::Pending),
            (OrderStatus::Pending, OrderStatus::Completed),
            (OrderStatus::Preparing, OrderStatus::Serving),
            (OrderStatus::Completed, OrderStatus::Pending),
        ];
        for (from, to) in cases {
            let err = from
                .validate_transition(to)
                .expect_err("transition should be rejected");
            match err {
                BoardError::InvalidTransition { from: f, to: t } => {
                    assert_eq!((f, t), (from, to));
                }
                other => panic!("unexpected error kind: {other}"),
            }
        }
    }

    #[test]
    fn status_round_trips_and_accepts_legacy_served() {
        for status in OrderStatus::PIPELINE {
            let encoded = serde_json::to_string(&status).expect("serialize status");
            assert_eq!(encoded, format!("\"{status}\""));
            let decoded: OrderStatus = serde_json::from_str(&encoded).expect("parse status");
            assert_eq!(decoded, status);
        }

        let legacy: OrderStatus = serde_json::from_str("\"served\"").expect("parse legacy status");
        assert_eq!(legacy, OrderStatus::Serving);
    }

    #[test]
    fn from_document_injects_the_id() {
        let doc = json!({
            "tableNumber": 4,
            "items": [{ "name": "Soup", "price": 5.0, "quantity": 2 }],
            "status": "pending",
            "totalAmount": 10.0,
            "createdAt": 1_700_000_000_000i64,
            "updatedAt": 1_700_000_000_000i64,
        });
        let order = Order::from_document("ord-1", doc).expect("decode order document");
        assert_eq!(order.id, "ord-1");
        assert_eq!(order.table_number, 4);
        assert_eq!(order.items[0].line_total(), 10.0);
    }

    #[test]
    fn from_document_rejects_non_objects() {
        let err = Order::from_document("ord-1", json!(42)).expect_err("non-object should fail");
        assert!(matches!(err, BoardError::FetchFailure(_)));
    }

    #[test]
    fn order_line_accepts_spec_style_field_names() {
        let parsed: OrderLine = serde_json::from_value(json!({
            "name": "Soup",
            "unitPrice": 5.0,
            "quantity": 2,
            "note": "no onions",
        }))
        .expect("parse order line with alias field names");
        assert_eq!(parsed.price, 5.0);
        assert_eq!(parsed.special_instructions.as_deref(), Some("no onions"));
    }

    #[test]
    fn new_order_totals_and_timestamps() {
        let order = NewOrder::from_lines(4, vec![line("Soup", 5.0, 2), line("Bread", 1.5, 1)]);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 11.5);
        assert_eq!(
            order.created_at, order.updated_at,
            "creation stamps both timestamps with the same instant"
        );
        order.validate().expect("well-formed order should validate");
    }

    #[test]
    fn new_order_validation_rejects_bad_payloads() {
        assert!(NewOrder::from_lines(0, vec![line("Soup", 5.0, 1)])
            .validate()
            .is_err());
        assert!(NewOrder::from_lines(4, vec![]).validate().is_err());
        assert!(NewOrder::from_lines(4, vec![line("Soup", 5.0, 0)])
            .validate()
            .is_err());
        assert!(NewOrder::from_lines(4, vec![line("Soup", -1.0, 1)])
            .validate()
            .is_err());
    }

    #[test]
    fn active_sort_is_fifo_by_creation() {
        let mut orders = vec![
            NewOrder::from_lines(1, vec![line("A", 1.0, 1)]).into_order("b".into()),
            NewOrder::from_lines(2, vec![line("B", 1.0, 1)]).into_order("a".into()),
        ];
        orders[0].created_at = 300;
        orders[1].created_at = 100;
        sort_active(&mut orders);
        assert_eq!(orders[0].id, "a");
        assert_eq!(orders[1].id, "b");
    }

    #[test]
    fn completed_sort_is_most_recent_first() {
        let mut orders = vec![
            NewOrder::from_lines(1, vec![line("A", 1.0, 1)]).into_order("a".into()),
            NewOrder::from_lines(2, vec![line("B", 1.0, 1)]).into_order("b".into()),
        ];
        orders[0].updated_at = 100;
        orders[1].updated_at = 300;
        sort_completed(&mut orders);
        assert_eq!(orders[0].id, "b");
        assert_eq!(orders[1].id, "a");
    }
}
