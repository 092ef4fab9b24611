//! Process entrypoint crate: wires the broker, the persistence backend
//! and every stage handler from `callaudit-stages` together, and serves
//! the operational HTTP surface. See `main.rs` for the actual wiring;
//! this crate's library surface is the handful of pieces `main.rs` and
//! its tests share.

pub mod backend;
pub mod http;
pub mod metrics;
pub mod state;

pub use backend::Stores;
pub use http::create_router;
pub use metrics::init_metrics;
pub use state::AppState;
