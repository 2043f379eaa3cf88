//! HTTP surface: routes, state, and metrics.

mod identify_routes;
pub mod metrics;
mod server;
pub mod state;

pub use server::{make_app, run_server};
pub use state::ServerState;
