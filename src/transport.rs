//! Transport boundary for performing calls over established sessions.
//!
//! This crate decides *which* backend a call goes to and whether that backend
//! is currently trusted; the wire protocol itself is an injected capability.
//! A [`Transport`] implementation owns connection establishment, request
//! framing and the peer-side socket lifecycle.
//!
//! Implementations classify their failures through the error taxonomy:
//! transport-level failures (dial errors, timeouts, resets) must be reported
//! as [`Error::Connection`], while well-formed errors produced by backend
//! business logic must be reported as [`Error::Application`]. The breaker
//! only ever counts connection errors against a backend.
//!
//! [`Error::Connection`]: crate::error::Error::Connection
//! [`Error::Application`]: crate::error::Error::Application

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

/// Capability set of the underlying RPC transport.
///
/// Methods return `impl Future + Send` so sessions can be driven from
/// spawned tasks.
pub trait Transport: Send + Sync + 'static {
    /// Per-address connection handle produced by [`Transport::connect`].
    type Conn: Send + Sync + 'static;

    /// Establish a connection handle for a backend address.
    ///
    /// Called once per address on first selection; the handle is cached and
    /// reused until the address is reported offline.
    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Conn>> + Send;

    /// Perform a request/response call over an established connection.
    fn call(
        &self,
        conn: &Self::Conn,
        route: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<Bytes>> + Send;

    /// Perform a fire-and-forget push over an established connection.
    fn push(
        &self,
        conn: &Self::Conn,
        route: &str,
        body: Bytes,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Release transport-wide resources. Called once during client shutdown,
    /// after background maintenance has stopped.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
