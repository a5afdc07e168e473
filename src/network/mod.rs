//! Network subsystem for UDP voice transport

pub mod addresses;
pub mod udp;

pub use addresses::{AddressLookup, InterfaceAddresses, StaticAddresses};
pub use udp::TransportSocket;
