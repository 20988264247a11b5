//! Remote booking service boundary.
//!
//! The engine talks to the service only through [`RemoteWriteApi`] and
//! [`ConnectivityProbe`]; [`HttpRemote`] is the production adapter.

mod api;
mod error;
mod http;

#[cfg(test)]
pub use api::MockRemoteWriteApi;
pub use api::{ConnectivityProbe, RemoteReceipt, RemoteWriteApi};
pub use error::RemoteError;
pub use http::{HttpRemote, IDEMPOTENCY_HEADER};
