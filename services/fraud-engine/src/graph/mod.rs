//! Graph server access: GraphSON decoding, transport, and the pooled client

pub mod client;
pub mod graphson;
pub mod transport;

pub use client::GraphClient;
pub use transport::{GraphTransport, HttpGraphTransport};
