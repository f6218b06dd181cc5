//! Backend inference server client and fleet availability view.

mod client;
mod error;
mod fleet;
pub mod testing;

pub use client::{BackendClient, HttpBackendClient, Probe, RecipeConfig};
pub use error::BackendError;
pub use fleet::FleetView;
