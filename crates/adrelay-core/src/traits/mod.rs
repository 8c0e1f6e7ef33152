//! Seams between the forwarding engine and the outside world.

pub mod store;
pub mod transport;

pub use store::Store;
pub use transport::{Transport, TransportFactory};
