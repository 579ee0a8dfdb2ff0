//! Unit tests for the circuit breaker module.

use super::*;
use crate::linker::AddressSet;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

// =========================================================================
// TEST DOUBLES
// =========================================================================

/// Transport whose connections are just the address string. Counts
/// connects; `call`/`push` answer according to a per-address failure set.
#[derive(Default)]
struct StubTransport {
    connects: AtomicUsize,
    failing: Mutex<std::collections::HashSet<String>>,
}

impl StubTransport {
    fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for StubTransport {
    type Conn = Arc<str>;

    async fn connect(&self, address: &str) -> crate::Result<Self::Conn> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::from(address))
    }

    async fn call(&self, conn: &Self::Conn, _route: &str, body: Bytes) -> crate::Result<Bytes> {
        if self.failing.lock().contains(conn.as_ref()) {
            return Err(Error::connection(conn.as_ref(), "reset"));
        }
        Ok(body)
    }

    async fn push(&self, conn: &Self::Conn, route: &str, body: Bytes) -> crate::Result<()> {
        self.call(conn, route, body).await.map(|_| ())
    }

    async fn close(&self) {}
}

/// Deterministic linker over a fixed route table: selection returns the
/// first non-excluded candidate and counts every `select` call.
struct TableLinker {
    routes: HashMap<String, Vec<Arc<str>>>,
    selects: AtomicUsize,
    offline_tx: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    offline_rx: Mutex<Option<mpsc::Receiver<Arc<str>>>>,
}

impl TableLinker {
    fn new(routes: &[(&str, &[&str])]) -> Self {
        let routes = routes
            .iter()
            .map(|(route, addresses)| {
                (
                    (*route).to_string(),
                    addresses.iter().map(|a| Arc::from(*a)).collect(),
                )
            })
            .collect();
        let (offline_tx, offline_rx) = mpsc::channel(8);
        Self {
            routes,
            selects: AtomicUsize::new(0),
            offline_tx: Mutex::new(Some(offline_tx)),
            offline_rx: Mutex::new(Some(offline_rx)),
        }
    }

    fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    async fn emit_offline(&self, address: &str) {
        let tx = self.offline_tx.lock().clone();
        if let Some(tx) = tx {
            tx.send(Arc::from(address)).await.unwrap();
        }
    }
}

impl Linker for TableLinker {
    fn select(&self, route: &str, exclude: &AddressSet) -> crate::Result<Arc<str>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.routes
            .get(route)
            .and_then(|addresses| {
                addresses
                    .iter()
                    .find(|address| !exclude.contains(*address))
                    .cloned()
            })
            .ok_or_else(|| Error::not_found_service(route))
    }

    fn candidate_count(&self, route: &str) -> usize {
        self.routes.get(route).map_or(0, Vec::len)
    }

    fn watch_offline(&self) -> Option<mpsc::Receiver<Arc<str>>> {
        self.offline_rx.lock().take()
    }

    fn close(&self) {
        self.offline_tx.lock().take();
    }
}

fn fast_config() -> BreakerConfig {
    BreakerConfig {
        break_duration: Duration::from_millis(50),
        // Keep the automatic cadences far away; tests drive rotation and
        // evaluation directly unless stated otherwise.
        rotation_interval: Duration::from_secs(600),
        eval_interval: Duration::from_secs(600),
        ..BreakerConfig::default()
    }
}

fn breaker(
    config: BreakerConfig,
    routes: &[(&str, &[&str])],
) -> (
    CircuitBreaker<StubTransport>,
    Arc<TableLinker>,
    Arc<StubTransport>,
) {
    let linker = Arc::new(TableLinker::new(routes));
    let transport = Arc::new(StubTransport::default());
    let cb = CircuitBreaker::new(
        config,
        Arc::clone(&linker) as Arc<dyn Linker>,
        Arc::clone(&transport),
    );
    (cb, linker, transport)
}

/// Push a session's breaker into the Open state.
fn force_open(cb: &CircuitBreaker<StubTransport>, session: &Session<Arc<str>>) {
    cb.feedback(session, false);
    session.evaluate(
        cb.config.error_percentage,
        cb.config.break_duration,
    );
    assert_eq!(session.status(), BreakerStatus::Open);
}

// =========================================================================
// SELECTION TESTS
// =========================================================================

#[tokio::test]
async fn test_unknown_route_fails_without_connecting() {
    let (cb, _, transport) = breaker(fast_config(), &[]);

    let err = cb.select_session("/missing").await.unwrap_err();
    assert!(matches!(err, Error::NotFoundService { ref route } if route == "/missing"));
    assert_eq!(transport.connect_count(), 0);
}

#[tokio::test]
async fn test_session_created_lazily_and_cached() {
    let (cb, _, transport) = breaker(fast_config(), &[("/r", &["a:1"])]);

    let first = cb.select_session("/r").await.unwrap();
    assert_eq!(first.address(), "a:1");
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(cb.session_count(), 1);

    // Second selection reuses the cached session.
    let second = cb.select_session("/r").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(transport.connect_count(), 1);
}

#[tokio::test]
async fn test_selection_skips_open_backend() {
    let (cb, _, _) = breaker(fast_config(), &[("/r", &["a:1", "b:2"])]);

    let a = cb.select_session("/r").await.unwrap();
    assert_eq!(a.address(), "a:1");
    force_open(&cb, &a);

    // "a:1" is rejected and excluded; selection moves on to "b:2".
    let next = cb.select_session("/r").await.unwrap();
    assert_eq!(next.address(), "b:2");
}

#[tokio::test]
async fn test_selection_bounded_by_candidate_count() {
    let (cb, linker, _) = breaker(fast_config(), &[("/r", &["a:1", "b:2", "c:3"])]);

    // Materialize and open every candidate.
    for _ in 0..3 {
        let session = cb.select_session("/r").await.unwrap();
        force_open(&cb, &session);
    }
    assert_eq!(cb.session_count(), 3);

    let before = linker.select_count();
    let err = cb.select_session("/r").await.unwrap_err();
    assert!(matches!(err, Error::NotFoundService { .. }));
    // At most one linker query per candidate.
    assert!(linker.select_count() - before <= 3);
}

#[tokio::test]
async fn test_pre_excluded_address_is_skipped() {
    let (cb, _, _) = breaker(fast_config(), &[("/r", &["a:1", "b:2"])]);

    // A caller that already failed against a:1 carries it in the exclusion
    // set; selection must move straight to the alternate.
    let mut exclude = AddressSet::new();
    exclude.insert(Arc::from("a:1"));
    let session = cb
        .select_session_excluding("/r", &mut exclude)
        .await
        .unwrap();
    assert_eq!(session.address(), "b:2");
}

#[tokio::test]
async fn test_connect_failure_surfaces() {
    struct FailingTransport;
    impl Transport for FailingTransport {
        type Conn = ();
        async fn connect(&self, address: &str) -> crate::Result<Self::Conn> {
            Err(Error::connection(address, "dial refused"))
        }
        async fn call(&self, _conn: &(), _route: &str, _body: Bytes) -> crate::Result<Bytes> {
            unreachable!("no session is ever established")
        }
        async fn push(&self, _conn: &(), _route: &str, _body: Bytes) -> crate::Result<()> {
            unreachable!("no session is ever established")
        }
        async fn close(&self) {}
    }

    let linker = Arc::new(TableLinker::new(&[("/r", &["a:1"])]));
    let cb = CircuitBreaker::new(fast_config(), linker, Arc::new(FailingTransport));

    let err = cb.select_session("/r").await.unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(cb.session_count(), 0);
}

// =========================================================================
// FEEDBACK AND STATE TESTS
// =========================================================================

#[tokio::test]
async fn test_feedback_counts_into_window() {
    let (cb, _, _) = breaker(fast_config(), &[("/r", &["a:1"])]);

    let session = cb.select_session("/r").await.unwrap();
    cb.feedback(&session, true);
    cb.feedback(&session, true);
    cb.feedback(&session, false);
    assert_eq!(session.window_totals(), (2, 1));
    assert_eq!(session.status(), BreakerStatus::Closed);
}

#[tokio::test]
async fn test_probe_admits_exactly_one_caller() {
    let (cb, _, _) = breaker(fast_config(), &[("/r", &["a:1"])]);

    let session = cb.select_session("/r").await.unwrap();
    force_open(&cb, &session);

    // Open circuit with one candidate: selection has nothing to offer.
    assert!(cb.select_session("/r").await.is_err());

    tokio::time::sleep(Duration::from_millis(70)).await;

    // The break elapsed: the first selection becomes the probe, the second
    // is refused while the probe is outstanding.
    let probe = cb.select_session("/r").await.unwrap();
    assert_eq!(probe.status(), BreakerStatus::HalfOpen);
    assert!(cb.select_session("/r").await.is_err());

    // A healthy probe closes the circuit for everyone.
    cb.feedback(&probe, true);
    assert_eq!(probe.status(), BreakerStatus::Closed);
    assert!(cb.select_session("/r").await.is_ok());
}

#[tokio::test]
async fn test_failed_probe_reopens() {
    let (cb, _, _) = breaker(fast_config(), &[("/r", &["a:1"])]);

    let session = cb.select_session("/r").await.unwrap();
    force_open(&cb, &session);
    tokio::time::sleep(Duration::from_millis(70)).await;

    let probe = cb.select_session("/r").await.unwrap();
    cb.feedback(&probe, false);
    assert_eq!(probe.status(), BreakerStatus::Open);
    assert!(cb.select_session("/r").await.is_err());

    // The re-armed break elapses and a new probe is allowed.
    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(cb.select_session("/r").await.is_ok());
}

#[tokio::test]
async fn test_disabled_breaker_is_pass_through() {
    let config = BreakerConfig {
        enabled: false,
        ..fast_config()
    };
    let (cb, _, _) = breaker(config, &[("/r", &["a:1"])]);

    let session = cb.select_session("/r").await.unwrap();
    for _ in 0..100 {
        cb.feedback(&session, false);
    }
    // Nothing recorded, nothing opened, always admitted.
    assert_eq!(session.window_totals(), (0, 0));
    assert_eq!(session.status(), BreakerStatus::Closed);
    assert!(cb.select_session("/r").await.is_ok());
}

// =========================================================================
// MAINTENANCE TASK TESTS
// =========================================================================

#[tokio::test]
async fn test_evaluation_task_opens_failing_backend() {
    let config = BreakerConfig {
        break_duration: Duration::from_secs(600),
        rotation_interval: Duration::from_secs(600),
        eval_interval: Duration::from_millis(25),
        ..BreakerConfig::default()
    };
    let (cb, _, _) = breaker(config, &[("/r", &["a:1"])]);

    let session = cb.select_session("/r").await.unwrap();
    // 3 failures, 1 success: 75% > 50%.
    cb.feedback(&session, false);
    cb.feedback(&session, false);
    cb.feedback(&session, false);
    cb.feedback(&session, true);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(session.status(), BreakerStatus::Open);
    assert!(cb.select_session("/r").await.is_err());
}

#[tokio::test]
async fn test_rotation_task_ages_out_counts() {
    let config = BreakerConfig {
        rotation_interval: Duration::from_millis(10),
        eval_interval: Duration::from_secs(600),
        window_slots: 2,
        ..fast_config()
    };
    let (cb, _, _) = breaker(config, &[("/r", &["a:1"])]);

    let session = cb.select_session("/r").await.unwrap();
    cb.feedback(&session, false);

    // With 2 slots rotating every 10ms, the failure is gone within ~30ms.
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(session.window_totals(), (0, 0));
}

#[tokio::test]
async fn test_offline_notification_discards_session() {
    let (cb, linker, transport) = breaker(fast_config(), &[("/r", &["a:1"])]);

    cb.select_session("/r").await.unwrap();
    assert_eq!(cb.session_count(), 1);

    linker.emit_offline("a:1").await;
    for _ in 0..50 {
        if cb.session_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(cb.session_count(), 0);

    // The next selection reconnects from scratch.
    cb.select_session("/r").await.unwrap();
    assert_eq!(transport.connect_count(), 2);
}

// =========================================================================
// SHUTDOWN TESTS
// =========================================================================

#[tokio::test]
async fn test_close_stops_tasks_and_clears_sessions() {
    let (cb, linker, _) = breaker(fast_config(), &[("/r", &["a:1"])]);

    cb.select_session("/r").await.unwrap();
    cb.close().await;

    assert_eq!(cb.session_count(), 0);
    assert!(cb.tasks.lock().is_empty());
    // The linker's offline sender was dropped by close.
    assert!(linker.offline_tx.lock().is_none());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (cb, _, _) = breaker(fast_config(), &[]);
    cb.close().await;
    cb.close().await;
}
