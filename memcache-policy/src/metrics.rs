//! Client metrics.
//!
//! Process-wide counters for endpoint lifecycle, request traffic, batching and
//! suppressed failures. Exposed through `metriken`'s registry, so any admin
//! endpoint that exports metriken metrics picks them up.

use metriken::{Counter, metric};

// ── Endpoint lifecycle ───────────────────────────────────────────

#[metric(
    name = "memcache/endpoint/opened",
    description = "Endpoints dialed by connect policies"
)]
pub static ENDPOINTS_OPENED: Counter = Counter::new();

#[metric(
    name = "memcache/endpoint/closed",
    description = "Endpoints closed on release"
)]
pub static ENDPOINTS_CLOSED: Counter = Counter::new();

#[metric(
    name = "memcache/endpoint/reused",
    description = "Acquires served from an idle pooled endpoint"
)]
pub static ENDPOINTS_REUSED: Counter = Counter::new();

#[metric(
    name = "memcache/endpoint/discarded",
    description = "Endpoints dropped because they were released mid-exchange"
)]
pub static ENDPOINTS_DISCARDED: Counter = Counter::new();

#[metric(
    name = "memcache/endpoint/connect_errors",
    description = "Failed dial attempts"
)]
pub static CONNECT_ERRORS: Counter = Counter::new();

// ── Requests ─────────────────────────────────────────────────────

#[metric(name = "memcache/request/sent", description = "Requests written")]
pub static REQUESTS_SENT: Counter = Counter::new();

#[metric(
    name = "memcache/request/errors",
    description = "Requests that failed in the request role"
)]
pub static REQUEST_ERRORS: Counter = Counter::new();

// ── Commit ───────────────────────────────────────────────────────

#[metric(
    name = "memcache/commit/queued",
    description = "Operations deferred by a batching commit policy"
)]
pub static OPERATIONS_QUEUED: Counter = Counter::new();

#[metric(
    name = "memcache/commit/flushes",
    description = "Non-empty batch flushes"
)]
pub static BATCHES_FLUSHED: Counter = Counter::new();

#[metric(
    name = "memcache/commit/discarded",
    description = "Queued operations discarded without being sent"
)]
pub static OPERATIONS_DISCARDED: Counter = Counter::new();

// ── Exception ────────────────────────────────────────────────────

#[metric(
    name = "memcache/exception/suppressed",
    description = "Failures suppressed by the exception policy"
)]
pub static FAILURES_SUPPRESSED: Counter = Counter::new();
