//! streamnab-server: HTTP wiring for the streamnab core library.
//!
//! Exposed as a library so integration tests can build the router
//! against mock upstreams; the binary in `main.rs` is a thin shell.

pub mod api;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
