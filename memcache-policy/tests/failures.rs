//! Failure injection: endpoint pairing, batch failure modes and suppression.

use memcache_policy::commit::{Autocommit, Batched};
use memcache_policy::connect::{Dedicated, Fault, MemoryServer, Pooled};
use memcache_policy::container::Plain;
use memcache_policy::exception::{Propagate, Suppress, Suppressed};
use memcache_policy::request::TextRequest;
use memcache_policy::tags::{Connect, Exception};
use memcache_policy::{Client, Context, Error, ErrorKind, Profile, Response, Status};
use proptest::prelude::*;

enum PooledProfile {}

impl Profile for PooledProfile {
    type Connect = Pooled<MemoryServer>;
    type Request = TextRequest;
    type Exception = Propagate;
    type Commit = Autocommit;
    type Container = Plain;
}

enum DedicatedProfile {}

impl Profile for DedicatedProfile {
    type Connect = Dedicated<MemoryServer>;
    type Request = TextRequest;
    type Exception = Propagate;
    type Commit = Autocommit;
    type Container = Plain;
}

enum BatchedProfile {}

impl Profile for BatchedProfile {
    type Connect = Pooled<MemoryServer>;
    type Request = TextRequest;
    type Exception = Propagate;
    type Commit = Batched;
    type Container = Plain;
}

enum Quiet {}

impl Profile for Quiet {
    type Connect = Pooled<MemoryServer>;
    type Request = TextRequest;
    type Exception = Suppress;
    type Commit = Autocommit;
    type Container = Plain;
}

enum QuietBatched {}

impl Profile for QuietBatched {
    type Connect = Pooled<MemoryServer>;
    type Request = TextRequest;
    type Exception = Suppress;
    type Commit = Batched;
    type Container = Plain;
}

fn faulty_server() -> MemoryServer {
    let server = MemoryServer::new();
    server.inject("server", Fault::ServerError);
    server.inject("garbage", Fault::Garbage);
    server.inject("hangup", Fault::Hangup);
    server
}

const KEYS: [&str; 5] = ["ok", "server", "garbage", "hangup", "bad key"];

// ── Acquire/release pairing ─────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every successful acquire is released exactly once whatever fails in
    /// between, and only cleanly finished endpoints return to the pool.
    #[test]
    fn pooled_pairing_survives_failures(picks in prop::collection::vec(0..KEYS.len(), 1..40)) {
        let client = Client::<PooledProfile>::with_connect(Pooled::new(faulty_server(), 2));
        for i in picks {
            let _ = client.get::<String>(KEYS[i]);
        }
        let pool = client.context().resolve::<Connect>();
        let counts = pool.stats();
        prop_assert_eq!(counts.acquired, counts.released);
        prop_assert_eq!(counts.outstanding(), 0);
        prop_assert!(pool.idle_count() <= 2);
    }

    #[test]
    fn dedicated_pairing_survives_failures(picks in prop::collection::vec(0..KEYS.len(), 1..40)) {
        let client = Client::<DedicatedProfile>::with_connect(Dedicated::new(faulty_server()));
        for i in picks {
            let _ = client.set(KEYS[i], &"v".to_string());
        }
        let counts = client.context().resolve::<Connect>().stats();
        prop_assert_eq!(counts.acquired, counts.released);
        prop_assert_eq!(counts.acquired, counts.dialed);
    }
}

#[test]
fn failed_exchanges_are_never_reused() {
    let server = faulty_server();
    let client = Client::<PooledProfile>::with_connect(Pooled::new(server.clone(), 4));

    assert_eq!(client.get::<String>("garbage").unwrap_err().kind(), ErrorKind::Protocol);
    assert_eq!(client.get::<String>("hangup").unwrap_err().kind(), ErrorKind::Io);
    // A complete error reply leaves the endpoint in a known state.
    assert_eq!(client.get::<String>("server").unwrap_err().kind(), ErrorKind::Server);

    let pool = client.context().resolve::<Connect>();
    let counts = pool.stats();
    assert_eq!(counts.poisoned, 2);
    assert_eq!(pool.idle_count(), 1);

    // The surviving endpoint is reused; nothing new is dialed.
    assert_eq!(client.get::<String>("ok").unwrap(), None);
    assert_eq!(pool.stats().dialed, 3);
    assert_eq!(pool.stats().reused, 1);
}

#[test]
fn refused_connection_is_a_connection_error() {
    let server = MemoryServer::new();
    server.refuse_connections(true);
    let client = Client::<PooledProfile>::with_connect(Pooled::new(server.clone(), 1));
    let err = client.set("k", &"v".to_string()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert_eq!(client.context().resolve::<Connect>().stats().acquired, 0);

    server.refuse_connections(false);
    assert_eq!(client.set("k", &"v".to_string()).unwrap(), Status::Stored);
}

#[test]
fn release_runs_when_an_operation_unwinds() {
    let ctx = Context::<PooledProfile>::with_connect(Pooled::new(MemoryServer::new(), 2));
    let pool = ctx.resolve::<Connect>();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut lease = memcache_policy::connect::ConnectPolicy::acquire(pool).unwrap();
        lease.poison();
        panic!("caller abandoned the operation");
    }));
    assert!(result.is_err());
    let counts = pool.stats();
    assert_eq!(counts.released, 1);
    assert_eq!(counts.poisoned, 1);
    assert_eq!(pool.idle_count(), 0);
}

// ── Batch failure modes ─────────────────────────────────────────────────

fn batch_client(commit: Batched) -> (MemoryServer, Client<BatchedProfile>) {
    let server = faulty_server();
    let ctx = Context::<BatchedProfile>::new(
        Pooled::new(server.clone(), 2),
        TextRequest::new(),
        Propagate,
        commit,
        Plain,
    );
    (server, Client::new(ctx))
}

fn queue(client: &Client<BatchedProfile>, keys: &[&str]) {
    for key in keys {
        assert_eq!(client.set(key, &"v".to_string()).unwrap(), Status::Queued);
    }
}

#[test]
fn abort_stops_at_the_failed_operation() {
    for _ in 0..5 {
        let (server, client) = batch_client(Batched::abort_on_failure());
        queue(&client, &["a", "server", "b", "c"]);

        let Err(Error::Commit(err)) = client.flush() else {
            panic!("expected a commit error");
        };
        assert_eq!(err.completed.len(), 1);
        assert_eq!(err.completed[0], (0, Response::Stored));
        assert_eq!(err.failed.len(), 1);
        assert_eq!(err.failed[0].0, 1);
        assert_eq!(err.failed[0].1.kind(), ErrorKind::Server);
        assert_eq!(err.skipped, 2);

        assert_eq!(server.log(), ["set a", "set server"]);
        assert_eq!(client.pending(), 0);
    }
}

#[test]
fn continue_sends_every_operation() {
    for _ in 0..5 {
        let (server, client) = batch_client(Batched::continue_on_failure());
        queue(&client, &["a", "server", "b", "garbage", "c"]);

        let Err(Error::Commit(err)) = client.flush() else {
            panic!("expected a commit error");
        };
        let completed: Vec<usize> = err.completed.iter().map(|(i, _)| *i).collect();
        let failed: Vec<(usize, ErrorKind)> = err.failed.iter().map(|(i, e)| (*i, e.kind())).collect();
        assert_eq!(completed, [0, 2, 4]);
        assert_eq!(failed, [(1, ErrorKind::Server), (3, ErrorKind::Protocol)]);
        assert_eq!(err.skipped, 0);

        assert_eq!(server.log(), ["set a", "set server", "set b", "set garbage", "set c"]);
        assert_eq!(server.len(), 3);
    }
}

#[test]
fn full_batch_rejects_without_flushing() {
    let (server, client) = batch_client(Batched::default().with_max_pending(2));
    queue(&client, &["a", "b"]);
    let err = client.set("c", &"v".to_string()).unwrap_err();
    assert!(matches!(err, Error::Request("batch full")));
    assert_eq!(server.command_count(), 0);
}

// ── Suppression ─────────────────────────────────────────────────────────

#[test]
fn suppressed_failure_is_recorded_exactly_once() {
    let client = Client::<Quiet>::with_connect(Pooled::new(faulty_server(), 2));

    assert_eq!(client.get::<String>("server").unwrap(), None);
    assert_eq!(client.set("garbage", &"v".to_string()).unwrap(), Status::Suppressed);
    assert_eq!(client.incr("hangup", 1).unwrap(), None);

    let records = client.context().resolve::<Exception>().records();
    let kinds: Vec<ErrorKind> = records.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, [ErrorKind::Server, ErrorKind::Protocol, ErrorKind::Io]);
    assert_eq!(
        records[0],
        Suppressed {
            kind: ErrorKind::Server,
            message: "server error: SERVER_ERROR injected fault".into(),
        }
    );

    // Successes leave no trace.
    assert_eq!(client.set("ok", &"v".to_string()).unwrap(), Status::Stored);
    assert_eq!(client.context().resolve::<Exception>().records().len(), 3);
}

#[test]
fn suppress_only_selected_kinds() {
    let ctx = Context::<Quiet>::new(
        Pooled::new(faulty_server(), 2),
        TextRequest::new(),
        Suppress::kinds([ErrorKind::Server]),
        Autocommit,
        Plain,
    );
    let client = Client::new(ctx);
    assert_eq!(client.delete("server").unwrap(), Status::Suppressed);
    assert_eq!(client.delete("garbage").unwrap_err().kind(), ErrorKind::Protocol);
    assert_eq!(client.context().resolve::<Exception>().records().len(), 1);
}

#[test]
fn suppressed_flush_returns_completed_replies() {
    let client = Client::<QuietBatched>::with_connect(Pooled::new(faulty_server(), 2));
    for key in ["a", "server", "b"] {
        client.set(key, &"v".to_string()).unwrap();
    }
    let replies = client.flush().unwrap();
    assert_eq!(replies, [Response::Stored]);

    let records = client.context().resolve::<Exception>().records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ErrorKind::Commit);
}
