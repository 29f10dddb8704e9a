pub mod error;
pub mod pickups;

pub use error::StoreError;
pub use pickups::{LoadedRequests, PickupStore};
