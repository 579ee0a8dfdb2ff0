//! Error types for typed error handling.
//!
//! This module defines the error taxonomy shared by routing, breaking and
//! calling:
//!
//! - [`Error::NotFoundService`] - no candidate backend for a route
//! - [`Error::Connection`] - the transport could not reach a backend
//! - [`Error::Application`] - a well-formed error from backend business logic
//! - [`Error::ClientClosed`] - the client has been shut down
//!
//! Exactly one predicate, [`Error::is_connection_error`], decides whether an
//! error counts against a backend's health. Application errors come from a
//! backend that responded correctly and must never trip its circuit.

/// Result type for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by routing, breaking and calling.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No backend currently serves the route, or every known candidate was
    /// excluded or unavailable during selection.
    #[error("not found service: {route}")]
    NotFoundService { route: String },

    /// The transport failed to reach or communicate with a specific backend
    /// (dial failure, timeout, reset).
    #[error("connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// A well-formed error returned by the backend's business logic.
    /// The backend responded correctly; this never counts as a failure.
    #[error("application error {code}: {message}")]
    Application { code: i32, message: String },

    /// The client was closed; the call never touched the network.
    #[error("client closed")]
    ClientClosed,

    /// The coordination store failed (bulk read, watch setup).
    #[error("registry error: {0}")]
    Registry(String),

    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Create a routing error for a route with no usable candidate.
    pub fn not_found_service(route: impl Into<String>) -> Self {
        Self::NotFoundService {
            route: route.into(),
        }
    }

    /// Create a connection-level error for a specific backend.
    pub fn connection(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create an application-level error as returned by a backend.
    pub fn application(code: i32, message: impl Into<String>) -> Self {
        Self::Application {
            code,
            message: message.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(reason: impl Into<String>) -> Self {
        Self::Registry(reason.into())
    }

    /// Whether this error is a connection-level failure of a backend.
    ///
    /// This is the single classification point for breaker feedback: only
    /// connection errors mark a backend unhealthy and trigger failover.
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
