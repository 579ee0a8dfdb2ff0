// =============================================================================
// Lint Configuration
// =============================================================================

// Safety: no unsafe anywhere in this crate
#![deny(unsafe_code)]
// Correctness: must handle all fallible operations
#![deny(unused_must_use)]
// Quality: pedantic but pragmatic
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(rust_2018_idioms)]
#![warn(unreachable_pub)]
#![allow(missing_debug_implementations)] // Session tables and stores hold non-Debug handles
// Allowed with documented reasons
#![allow(clippy::missing_errors_doc)] // Error returns self-documenting via type
#![allow(clippy::module_name_repetitions)] // e.g., breaker::BreakerConfig is clearer
#![allow(clippy::doc_markdown)] // Too many false positives in code docs
#![allow(clippy::must_use_candidate)] // Not all returned values need annotation

//! Client-side routing and failure isolation for URI-addressed RPC backends.
//!
//! This crate turns a logical route (a URI path) into a healthy backend
//! connection while shielding callers from cascading failures. It combines:
//!
//! - **Discovery** - a pluggable [`Linker`] mapping routes to candidate
//!   addresses, with a fixed-address implementation ([`FixedLinker`]) and a
//!   coordination-store-backed one ([`RegistryLinker`])
//! - **Circuit breaking** - one Closed/Open/HalfOpen state machine per
//!   backend with a rolling failure-rate window and single-flight recovery
//!   probes ([`CircuitBreaker`])
//! - **Failover** - a bounded retry loop across alternate backends for
//!   connection-level failures only ([`Client`])
//!
//! The wire protocol itself is injected through the [`Transport`] trait;
//! this crate never frames a request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use tether::{Client, ClientConfig, FixedLinker};
//! # #[derive(Clone)] struct MyTransport;
//! # impl tether::Transport for MyTransport {
//! #     type Conn = ();
//! #     async fn connect(&self, _address: &str) -> tether::Result<()> { Ok(()) }
//! #     async fn call(&self, _conn: &(), _route: &str, body: Bytes) -> tether::Result<Bytes> { Ok(body) }
//! #     async fn push(&self, _conn: &(), _route: &str, _body: Bytes) -> tether::Result<()> { Ok(()) }
//! #     async fn close(&self) {}
//! # }
//!
//! # async fn example() -> tether::Result<()> {
//! let linker = Arc::new(FixedLinker::new("127.0.0.1:9090"));
//! let client = Client::new(ClientConfig::default(), linker, MyTransport)?;
//!
//! let _reply = client.pull("/math/divide", Bytes::from(r#"[10, 2]"#)).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

/// Per-backend circuit breaking and failure-aware session selection.
pub mod breaker;

/// The public call surface: pull, push and asynchronous pull with failover.
pub mod client;

/// Configuration types for the client and the registry linker.
pub mod config;

/// Centralized constants for resilience defaults.
pub mod constants;

/// Error taxonomy shared by routing, breaking and calling.
pub mod error;

/// Backend discovery: mapping routes to candidate addresses.
pub mod linker;

/// Per-address session: connection handle plus breaker state.
pub mod session;

/// Transport boundary for performing calls over established sessions.
pub mod transport;

pub use breaker::{BreakerConfig, BreakerStatus, CircuitBreaker};
pub use client::Client;
pub use config::{ClientConfig, RegistryConfig};
pub use error::{Error, Result};
pub use linker::{
    AddressSet, FixedLinker, Linker, MemoryStore, RegistryEvent, RegistryLinker, RegistryStore,
    ServiceInfo,
};
pub use session::Session;
pub use transport::Transport;
