//! Client networking: the transport, the background worker that owns it,
//! and typed decoding of responses.

pub mod decode;
pub mod transport;
pub mod worker;

pub use transport::{TransportClient, TransportError};
pub use worker::{spawn_worker, Completion, NetworkJob};
