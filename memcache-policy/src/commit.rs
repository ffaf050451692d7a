//! The `commit` role: when mutations reach the server.
//!
//! [`Autocommit`] sends every operation as it is issued. [`Batched`] queues
//! mutations and sends them, in order, when flushed.
//!
//! Both are driven the same way: the client offers each mutation to
//! [`CommitPolicy::enqueue`] and executes it only if it is handed back, and
//! calls [`CommitPolicy::flush`] with a closure that executes one queued
//! operation.

use std::collections::VecDeque;

use parking_lot::Mutex;
use protocol_memcache::Response;
use tracing::{debug, trace};

use crate::error::CommitError;
use crate::metrics;
use crate::{Error, Operation};

/// Behavior bound to the [`Commit`](crate::tags::Commit) tag.
pub trait CommitPolicy {
    /// Offer an operation. `Some` hands it back to be executed now; `None`
    /// means it was queued for the next flush.
    fn enqueue(&self, op: Operation) -> Result<Option<Operation>, Error>;

    /// Execute queued operations in enqueue order with `send`, returning
    /// their replies in the same order.
    fn flush<F>(&self, send: F) -> Result<Vec<Response>, Error>
    where
        F: FnMut(&Operation) -> Result<Response, Error>;

    /// Number of queued operations.
    fn pending(&self) -> usize;

    fn state(&self) -> CommitState;

    /// What to do with queued operations when the owning client is dropped.
    fn teardown(&self) -> Teardown;
}

/// Commit state machine: `Idle -> Accumulating -> Flushing -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitState {
    #[default]
    Idle,
    Accumulating,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Flush,
    Discard,
}

/// Execute everything immediately. Flushing is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct Autocommit;

impl CommitPolicy for Autocommit {
    #[inline]
    fn enqueue(&self, op: Operation) -> Result<Option<Operation>, Error> {
        Ok(Some(op))
    }

    fn flush<F>(&self, _send: F) -> Result<Vec<Response>, Error>
    where
        F: FnMut(&Operation) -> Result<Response, Error>,
    {
        Ok(Vec::new())
    }

    fn pending(&self) -> usize {
        0
    }

    fn state(&self) -> CommitState {
        CommitState::Idle
    }

    fn teardown(&self) -> Teardown {
        Teardown::Discard
    }
}

/// How a batch reacts to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Stop at the first failure; later operations are discarded unsent.
    #[default]
    Abort,
    /// Send every operation; report all failures together.
    Continue,
}

#[derive(Debug, Default)]
struct Queue {
    ops: VecDeque<Operation>,
    state: CommitState,
}

/// Queue mutations until flushed.
///
/// Flushing happens only on [`flush`](CommitPolicy::flush) (or
/// `Client::flush`) and when the owning client is dropped, never on a timer
/// or when the queue fills. A failed flush reports a [`CommitError`] and
/// leaves the queue empty; nothing is retried.
///
/// Enqueue and flush may be called from several threads. Enqueues are
/// serialized by the queue lock; flushes are serialized by a separate lock so
/// two flushes never interleave, while enqueues issued during a flush land in
/// the next batch.
#[derive(Debug)]
pub struct Batched {
    queue: Mutex<Queue>,
    flushing: Mutex<()>,
    mode: FailureMode,
    max_pending: Option<usize>,
    teardown: Teardown,
}

impl Default for Batched {
    fn default() -> Self {
        Self::new(FailureMode::Abort)
    }
}

impl Batched {
    pub fn new(mode: FailureMode) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            flushing: Mutex::new(()),
            mode,
            max_pending: None,
            teardown: Teardown::Flush,
        }
    }

    /// Stop at the first failure.
    pub fn abort_on_failure() -> Self {
        Self::new(FailureMode::Abort)
    }

    /// Send every queued operation whatever fails.
    pub fn continue_on_failure() -> Self {
        Self::new(FailureMode::Continue)
    }

    /// Reject enqueues beyond `max` pending operations with
    /// [`Error::Request`].
    pub fn with_max_pending(mut self, max: usize) -> Self {
        self.max_pending = Some(max);
        self
    }

    /// Drop queued operations, rather than flush them, when the owning
    /// client is dropped.
    pub fn discard_on_drop(mut self) -> Self {
        self.teardown = Teardown::Discard;
        self
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }
}

/// Ends a flush, on return or unwind: operations not yet sent are counted
/// as discarded and the state leaves `Flushing`.
struct Settle<'a> {
    queue: &'a Mutex<Queue>,
    unsent: usize,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if self.unsent > 0 {
            metrics::OPERATIONS_DISCARDED.add(self.unsent as u64);
        }
        let mut queue = self.queue.lock();
        queue.state = if queue.ops.is_empty() {
            CommitState::Idle
        } else {
            CommitState::Accumulating
        };
    }
}

impl CommitPolicy for Batched {
    fn enqueue(&self, op: Operation) -> Result<Option<Operation>, Error> {
        if !op.is_mutation() {
            return Ok(Some(op));
        }
        op.validate()?;

        let mut queue = self.queue.lock();
        if let Some(max) = self.max_pending
            && queue.ops.len() >= max
        {
            return Err(Error::Request("batch full"));
        }
        trace!(role = "commit", op = op.name(), pending = queue.ops.len() + 1, "enqueue");
        queue.ops.push_back(op);
        if queue.state == CommitState::Idle {
            queue.state = CommitState::Accumulating;
        }
        metrics::OPERATIONS_QUEUED.increment();
        Ok(None)
    }

    fn flush<F>(&self, mut send: F) -> Result<Vec<Response>, Error>
    where
        F: FnMut(&Operation) -> Result<Response, Error>,
    {
        let _flushing = self.flushing.lock();
        let batch: Vec<Operation> = {
            let mut queue = self.queue.lock();
            if queue.ops.is_empty() {
                return Ok(Vec::new());
            }
            queue.state = CommitState::Flushing;
            queue.ops.drain(..).collect()
        };

        debug!(role = "commit", pending = batch.len(), mode = ?self.mode, "flush");
        metrics::BATCHES_FLUSHED.increment();

        let mut settle = Settle {
            queue: &self.queue,
            unsent: batch.len(),
        };
        let mut completed = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();
        for (index, op) in batch.iter().enumerate() {
            let result = send(op);
            settle.unsent -= 1;
            match result {
                Ok(response) => completed.push((index, response)),
                Err(e) => {
                    failed.push((index, e));
                    if self.mode == FailureMode::Abort {
                        break;
                    }
                }
            }
        }
        let skipped = settle.unsent;
        drop(settle);

        if failed.is_empty() {
            Ok(completed.into_iter().map(|(_, response)| response).collect())
        } else {
            Err(CommitError {
                completed,
                failed,
                skipped,
            }
            .into())
        }
    }

    fn pending(&self) -> usize {
        self.queue.lock().ops.len()
    }

    fn state(&self) -> CommitState {
        self.queue.lock().state
    }

    fn teardown(&self) -> Teardown {
        self.teardown
    }
}
