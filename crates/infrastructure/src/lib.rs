pub mod loopback_transport;
pub mod slot_store;

pub use loopback_transport::LoopbackTransport;
pub use slot_store::*;
