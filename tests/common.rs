//! Common test utilities for integration tests.
//!
//! Provides:
//! - `MockTransport` - scriptable in-memory transport recording every
//!   attempt, for exercising failover and feedback without a network
//! - `register`/`deregister` - registry fixtures over `MemoryStore`
//! - config constructors tuned for fast tests

#![allow(dead_code)] // Each integration test crate uses a subset of these.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tether::{ClientConfig, Error, MemoryStore, Result, ServiceInfo, Transport};

/// What a backend address does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Echo the request body back.
    Echo,
    /// Fail at the connection level (counts against the backend).
    ConnError,
    /// Return a well-formed application error (does not count).
    AppError,
}

/// Scriptable transport: connections are the address itself, behavior is
/// looked up per address, and every attempt is recorded.
#[derive(Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    attempts: Mutex<Vec<String>>,
    connects: AtomicUsize,
    closed: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behavior of one backend address (default is `Echo`).
    pub fn set_behavior(&self, address: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .insert(address.to_string(), behavior);
    }

    /// Addresses of every call/push attempt so far, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn clear_attempts(&self) {
        self.attempts.lock().clear();
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn outcome(&self, address: &str, body: Bytes) -> Result<Bytes> {
        self.attempts.lock().push(address.to_string());
        match self
            .behaviors
            .lock()
            .get(address)
            .copied()
            .unwrap_or(Behavior::Echo)
        {
            Behavior::Echo => Ok(body),
            Behavior::ConnError => Err(Error::connection(address, "connection reset")),
            Behavior::AppError => Err(Error::application(1001, "invalid argument")),
        }
    }
}

impl Transport for MockTransport {
    type Conn = Arc<str>;

    async fn connect(&self, address: &str) -> Result<Self::Conn> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::from(address))
    }

    async fn call(&self, conn: &Self::Conn, _route: &str, body: Bytes) -> Result<Bytes> {
        self.outcome(conn, body)
    }

    async fn push(&self, conn: &Self::Conn, _route: &str, body: Bytes) -> Result<()> {
        self.outcome(conn, body).map(|_| ())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Forwards to an `Arc<MockTransport>` so tests keep a handle for
/// assertions while the client owns the transport value.
pub struct SharedTransport(pub Arc<MockTransport>);

impl Transport for SharedTransport {
    type Conn = Arc<str>;

    async fn connect(&self, address: &str) -> Result<Self::Conn> {
        self.0.connect(address).await
    }

    async fn call(&self, conn: &Self::Conn, route: &str, body: Bytes) -> Result<Bytes> {
        self.0.call(conn, route, body).await
    }

    async fn push(&self, conn: &Self::Conn, route: &str, body: Bytes) -> Result<()> {
        self.0.push(conn, route, body).await
    }

    async fn close(&self) {
        self.0.close().await;
    }
}

/// Register a backend in the store under `namespace`.
pub fn register(store: &MemoryStore, namespace: &str, address: &str, routes: &[&str]) {
    let info = ServiceInfo::new(routes.iter().copied());
    store.put(
        format!("{namespace}{address}"),
        serde_json::to_string(&info).expect("ServiceInfo serializes"),
    );
}

/// Deregister a backend from the store under `namespace`.
pub fn deregister(store: &MemoryStore, namespace: &str, address: &str) {
    store.delete(&format!("{namespace}{address}"));
}

/// Config with breaker cadences pushed far out: breaker state only changes
/// when a test drives it.
pub fn quiet_config() -> ClientConfig {
    ClientConfig {
        break_duration_ms: 600_000,
        rotation_interval_ms: 600_000,
        eval_interval_ms: 600_000,
        ..ClientConfig::default()
    }
}

/// Config with a fast evaluation cadence and slow rotation, so recorded
/// failures reliably trip the breaker within ~100ms.
pub fn fast_eval_config() -> ClientConfig {
    ClientConfig {
        break_duration_ms: 600_000,
        rotation_interval_ms: 600_000,
        eval_interval_ms: 25,
        ..ClientConfig::default()
    }
}
