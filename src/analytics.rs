//! Dashboard statistics derived from the order sets.
//!
//! Pure read-time projections: nothing here mutates, reorders or caches
//! anything, so the tiles can be recomputed on every render without
//! drifting from the authoritative sets.

use serde::Serialize;

use crate::orders::{Order, OrderStatus};

/// Per-status counts for the kitchen board tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KitchenStats {
    pub pending: usize,
    pub preparing: usize,
    pub ready: usize,
    pub serving: usize,
}

/// Count active orders per pipeline stage.
pub fn kitchen_stats(active: &[Order]) -> KitchenStats {
    let mut stats = KitchenStats::default();
    for order in active {
        match order.status {
            OrderStatus::Pending => stats.pending += 1,
            OrderStatus::Preparing => stats.preparing += 1,
            OrderStatus::Ready => stats.ready += 1,
            OrderStatus::Serving => stats.serving += 1,
            // Completed orders do not belong on the kitchen board; the
            // active view filters them, but tolerate them here anyway.
            OrderStatus::Completed => {}
        }
    }
    stats
}

/// Gross revenue of a set of orders.
pub fn revenue(orders: &[Order]) -> f64 {
    orders.iter().map(|o| o.total_amount).sum()
}

/// Sales roll-up for the dashboard header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesSummary {
    pub order_count: usize,
    pub revenue: f64,
    pub average_ticket: f64,
}

/// Summarize a completed set: count, revenue, average ticket.
pub fn sales_summary(completed: &[Order]) -> SalesSummary {
    let order_count = completed.len();
    let revenue = revenue(completed);
    let average_ticket = if order_count == 0 {
        0.0
    } else {
        revenue / order_count as f64
    };
    SalesSummary {
        order_count,
        revenue,
        average_ticket,
    }
}
