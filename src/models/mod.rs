pub mod action;
pub mod coordinate;
pub mod delivery;
pub mod event;
pub mod geofence;
