pub mod connectivity;
pub mod controller;
pub mod gps;
pub mod queue;
pub mod store;
pub mod sync;
