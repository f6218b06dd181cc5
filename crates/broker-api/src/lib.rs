//! HTTP surface for the job broker: upload, result, notify, and progress
//! endpoints backed by [`broker_dispatch::JobRegistry`]. Contains no
//! scheduling logic of its own.

mod error;
mod handlers;
mod router;
mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
