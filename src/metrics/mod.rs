use std::sync::atomic::{AtomicU64, Ordering};

// Global counters (low overhead). These are coarse-grained and process-wide.
static SESSIONS_OPENED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_CLOSED: AtomicU64 = AtomicU64::new(0);
static SESSIONS_FAILED: AtomicU64 = AtomicU64::new(0);
static CONNECT_FAILURES: AtomicU64 = AtomicU64::new(0);
static BYTES_RECEIVED: AtomicU64 = AtomicU64::new(0);

#[inline]
pub fn inc_sessions_opened() {
    SESSIONS_OPENED.fetch_add(1, Ordering::Relaxed);
}
#[inline]
pub fn inc_sessions_closed() {
    SESSIONS_CLOSED.fetch_add(1, Ordering::Relaxed);
}
#[inline]
pub fn inc_sessions_failed() {
    SESSIONS_FAILED.fetch_add(1, Ordering::Relaxed);
}
#[inline]
pub fn inc_connect_failures() {
    CONNECT_FAILURES.fetch_add(1, Ordering::Relaxed);
}
#[inline]
pub fn inc_bytes_received(n: u64) {
    BYTES_RECEIVED.fetch_add(n, Ordering::Relaxed);
}

pub fn sessions_opened() -> u64 {
    SESSIONS_OPENED.load(Ordering::Relaxed)
}
pub fn sessions_closed() -> u64 {
    SESSIONS_CLOSED.load(Ordering::Relaxed)
}
pub fn sessions_failed() -> u64 {
    SESSIONS_FAILED.load(Ordering::Relaxed)
}
pub fn connect_failures() -> u64 {
    CONNECT_FAILURES.load(Ordering::Relaxed)
}
pub fn bytes_received() -> u64 {
    BYTES_RECEIVED.load(Ordering::Relaxed)
}

pub fn snapshot() -> String {
    // Simple text format (Prometheus-style without HELP/TYPE lines for brevity)
    format!(
        "aioreq_sessions_opened {}\naioreq_sessions_closed {}\naioreq_sessions_failed {}\naioreq_connect_failures {}\naioreq_bytes_received {}\n",
        SESSIONS_OPENED.load(Ordering::Relaxed),
        SESSIONS_CLOSED.load(Ordering::Relaxed),
        SESSIONS_FAILED.load(Ordering::Relaxed),
        CONNECT_FAILURES.load(Ordering::Relaxed),
        BYTES_RECEIVED.load(Ordering::Relaxed),
    )
}
