//! Carnet API - authenticated access to the vehicle backends.
//!
//! Every call goes through the [`Gateway`], which keeps the session usable
//! (refreshing or logging in as needed) before attaching credentials.
//! State-changing actions first obtain a single-use secure token from the
//! PIN challenge in [`secure`].

pub mod gateway;
pub mod region;
pub mod responses;
pub mod secure;
pub mod vehicle;
pub mod vsr;


pub use gateway::{ApiRequest, ApiResponse, Gateway};
pub use region::{RegionEndpoints, RegionResolver};
pub use secure::SecureToken;
pub use vehicle::{LockAction, Toggle, VehicleClient};
pub use vsr::{Door, DoorLocks, LockState, VehicleStatusReport};
