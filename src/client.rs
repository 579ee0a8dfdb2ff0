//! The public call surface: pull, push and asynchronous pull with failover.
//!
//! A [`Client`] turns a logical route into a call against a healthy backend:
//! it selects a session through the circuit breaker, performs the call over
//! the injected transport, feeds the outcome back, and - for connection
//! failures only - retries against alternate backends within a bounded
//! attempt budget.
//!
//! Outcome classification is deliberately asymmetric: a connection failure
//! marks the backend unhealthy and triggers failover, while an application
//! error came from a backend that answered correctly - it is surfaced
//! immediately and never retried (retrying would re-run a logically failed
//! operation).
//!
//! The client is also the process lifecycle object: `Client::new` starts
//! discovery and breaker maintenance, [`Client::close`] tears everything
//! down exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::breaker::{BreakerStatus, CircuitBreaker};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::linker::{AddressSet, Linker};
use crate::session::Session;
use crate::transport::Transport;

struct Inner<T: Transport> {
    breaker: CircuitBreaker<T>,
    transport: Arc<T>,
    max_try: usize,
    closed: AtomicBool,
}

/// RPC client with failure-aware routing and bounded failover.
///
/// Cheap to clone; all clones share the same sessions, breaker state and
/// closed flag. Must be created inside a Tokio runtime.
pub struct Client<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .field("max_try", &self.inner.max_try)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Client<T> {
    /// Create a client over a linker and a transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration fails validation.
    pub fn new(config: ClientConfig, linker: Arc<dyn Linker>, transport: T) -> Result<Self> {
        config.validate()?;
        let transport = Arc::new(transport);
        let breaker = CircuitBreaker::new(config.breaker(), linker, Arc::clone(&transport));
        info!(
            failover_count = config.failover_count,
            circuit_breaker = config.circuit_breaker,
            "rpc client started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                breaker,
                transport,
                max_try: config.failover_count + 1,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Synchronous request/response call with failover.
    ///
    /// Attempts up to `failover_count + 1` backends. Returns the first
    /// healthy outcome; an application error ends the call immediately. A
    /// backend that fails at the connection level is excluded from the
    /// remaining attempts of this call. After exhausting the budget the
    /// last connection error is surfaced.
    ///
    /// # Errors
    ///
    /// [`Error::ClientClosed`] after [`Client::close`];
    /// [`Error::NotFoundService`] when routing fails; the final attempt's
    /// [`Error::Connection`] after exhausted failover;
    /// [`Error::Application`] as returned by the backend.
    pub async fn pull(&self, route: &str, body: Bytes) -> Result<Bytes> {
        self.ensure_open()?;
        let mut exclude = AddressSet::new();
        let mut last: Option<Error> = None;
        for attempt in 0..self.inner.max_try {
            let session = match self
                .inner
                .breaker
                .select_session_excluding(route, &mut exclude)
                .await
            {
                Ok(session) => session,
                // A routing failure is terminal; when alternates already
                // failed, the connection error is the useful diagnostic.
                Err(err) => return Err(last.unwrap_or(err)),
            };
            match self
                .inner
                .transport
                .call(session.conn(), route, body.clone())
                .await
            {
                Ok(reply) => {
                    self.inner.breaker.feedback(&session, true);
                    return Ok(reply);
                }
                Err(err) => {
                    if !self.record_failure(route, &session, attempt, &err) {
                        return Err(err);
                    }
                    exclude.insert(session.address_shared());
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::not_found_service(route)))
    }

    /// Fire-and-forget push with the same failover loop as [`Client::pull`],
    /// expecting no result payload.
    ///
    /// # Errors
    ///
    /// Same as [`Client::pull`].
    pub async fn push(&self, route: &str, body: Bytes) -> Result<()> {
        self.ensure_open()?;
        let mut exclude = AddressSet::new();
        let mut last: Option<Error> = None;
        for attempt in 0..self.inner.max_try {
            let session = match self
                .inner
                .breaker
                .select_session_excluding(route, &mut exclude)
                .await
            {
                Ok(session) => session,
                Err(err) => return Err(last.unwrap_or(err)),
            };
            match self
                .inner
                .transport
                .push(session.conn(), route, body.clone())
                .await
            {
                Ok(()) => {
                    self.inner.breaker.feedback(&session, true);
                    return Ok(());
                }
                Err(err) => {
                    if !self.record_failure(route, &session, attempt, &err) {
                        return Err(err);
                    }
                    exclude.insert(session.address_shared());
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::not_found_service(route)))
    }

    /// Asynchronous single-attempt call.
    ///
    /// Performs exactly one attempt (no failover) on a background task and
    /// delivers the outcome through `reply`. A oneshot channel always has
    /// room for its one value, so delivery never blocks. If the client is
    /// already closed the closed error is delivered immediately without
    /// touching the network.
    pub fn async_pull(&self, route: &str, body: Bytes, reply: oneshot::Sender<Result<Bytes>>) {
        if self.is_closed() {
            let _ = reply.send(Err(Error::ClientClosed));
            return;
        }
        let inner = Arc::clone(&self.inner);
        let route = route.to_string();
        tokio::spawn(async move {
            let outcome = Self::attempt_once(&inner, &route, body).await;
            // The caller may have dropped the receiver; that is their
            // prerogative.
            let _ = reply.send(outcome);
        });
    }

    /// Circuit status snapshot for every backend the client has talked to.
    pub fn breaker_states(&self) -> Vec<(Arc<str>, BreakerStatus)> {
        self.inner.breaker.states()
    }

    /// Whether [`Client::close`] has been invoked.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Shut the client down: stop accepting calls, stop breaker
    /// maintenance, close the linker, then the transport. In-flight calls
    /// may still complete. Idempotent - a second call is a no-op.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("client already closed");
            return;
        }
        info!("closing rpc client");
        self.inner.breaker.close().await;
        self.inner.transport.close().await;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        Ok(())
    }

    /// Feed an attempt's failure back to the breaker. Returns whether the
    /// failure is worth a failover (i.e. it was a connection error).
    fn record_failure(
        &self,
        route: &str,
        session: &Session<T::Conn>,
        attempt: usize,
        err: &Error,
    ) -> bool {
        let connection_error = err.is_connection_error();
        self.inner.breaker.feedback(session, !connection_error);
        if connection_error {
            debug!(
                route = %route,
                address = %session.address(),
                attempt,
                error = %err,
                "connection failed, trying next backend"
            );
        }
        connection_error
    }

    async fn attempt_once(inner: &Inner<T>, route: &str, body: Bytes) -> Result<Bytes> {
        if inner.closed.load(Ordering::SeqCst) {
            return Err(Error::ClientClosed);
        }
        let session = inner.breaker.select_session(route).await?;
        match inner.transport.call(session.conn(), route, body).await {
            Ok(reply) => {
                inner.breaker.feedback(&session, true);
                Ok(reply)
            }
            Err(err) => {
                inner.breaker.feedback(&session, !err.is_connection_error());
                Err(err)
            }
        }
    }
}
