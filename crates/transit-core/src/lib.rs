//! Fleet model, shared state registry and wire protocol for transit-sync.

pub mod events;
pub mod models;
pub mod state;

pub use events::{Channel, ClientEvent, DecodeError, ServerEvent};
pub use models::{BusLocation, BusLocationUpdate, PickupRequest, Route, Schedule, TransportState};
pub use state::StateRegistry;
