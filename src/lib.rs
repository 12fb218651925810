//! orderboard - order-management core for a restaurant admin dashboard.
//!
//! Mirrors a remote realtime order store into local state, drives the
//! order status pipeline (`pending -> preparing -> ready -> serving ->
//! completed`), and exposes the menu boundary and dashboard statistics an
//! admin UI binds to. The remote store owns persistence and querying;
//! this crate owns the synchronization and lifecycle rules.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use orderboard::{AccessMode, OrderBoard, RestStore, StoreClient, StoreConfig};
//!
//! # async fn run() -> Result<(), orderboard::BoardError> {
//! let config = StoreConfig::from_env()?;
//! let store = Arc::new(RestStore::new(StoreClient::new(config)?));
//! let board = OrderBoard::start(store, AccessMode::poll()).await?;
//! for order in board.active_orders() {
//!     println!("table {}: {}", order.table_number, order.status);
//! }
//! # Ok(())
//! # }
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod menu;
pub mod orders;
pub mod store;
pub mod sync;

pub use api::{ConnectivityResult, StoreClient};
pub use config::StoreConfig;
pub use error::BoardError;
pub use manager::{Connectivity, OrderBoard, DEFAULT_COMPLETED_REFRESH};
pub use menu::{MenuClient, MenuItem, MenuItemPatch, NewMenuItem};
pub use orders::{NewOrder, Order, OrderLine, OrderStatus};
pub use store::{MemoryStore, OrderStore, RestStore};
pub use sync::{
    AccessMode, FeedCallback, FeedEvent, SubscriptionHandle, SyncAdapter, DEFAULT_POLL_INTERVAL,
};

/// Install the default tracing subscriber: env-filter driven, `info` when
/// `RUST_LOG` is unset. Safe to call more than once; later calls are
/// no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
