pub mod client;
pub mod set;
pub mod transport;

pub use client::UplinkClient;
pub use set::{Uplink, UplinkHealth, UplinkSet};
pub use transport::{FetchRequest, RemoteMetadata, RemoteResponse};
