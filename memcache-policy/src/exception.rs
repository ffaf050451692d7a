//! The `exception` role: the single place failure fate is decided.
//!
//! Every other role returns typed [`Error`]s and nothing more. The client
//! hands each one to the bound [`ExceptionPolicy`], which propagates it,
//! replaces it, or swallows it.

use parking_lot::Mutex;
use tracing::warn;

use crate::metrics;
use crate::{Error, ErrorKind};

/// Behavior bound to the [`Exception`](crate::tags::Exception) tag.
pub trait ExceptionPolicy {
    fn handle(&self, failure: Error) -> Outcome;
}

/// What the caller sees for one failure.
#[derive(Debug)]
pub enum Outcome {
    /// Return the failure unchanged.
    Propagate(Error),
    /// Return this failure in place of the original.
    Translate(Error),
    /// Return no failure. The policy has recorded it.
    Suppress,
}

impl Outcome {
    /// The error to return to the caller, if any.
    pub fn into_error(self) -> Option<Error> {
        match self {
            Outcome::Propagate(e) | Outcome::Translate(e) => Some(e),
            Outcome::Suppress => None,
        }
    }
}

/// Surface every failure as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Propagate;

impl ExceptionPolicy for Propagate {
    #[inline]
    fn handle(&self, failure: Error) -> Outcome {
        Outcome::Propagate(failure)
    }
}

/// Map every failure through a function.
///
/// ```
/// use memcache_policy::{Error, ErrorKind};
/// use memcache_policy::exception::{ExceptionPolicy, Translate};
///
/// // Report a dropped connection as an unreachable server.
/// fn unreachable(e: Error) -> Error {
///     match e {
///         Error::Io(io) => Error::Connection(io),
///         other => other,
///     }
/// }
///
/// let policy = Translate::new(unreachable as fn(Error) -> Error);
/// let eof = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
/// let err = policy.handle(Error::Io(eof)).into_error().unwrap();
/// assert_eq!(err.kind(), ErrorKind::Connection);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Translate<F> {
    map: F,
}

impl<F: Fn(Error) -> Error> Translate<F> {
    pub fn new(map: F) -> Self {
        Self { map }
    }
}

impl<F: Fn(Error) -> Error> ExceptionPolicy for Translate<F> {
    fn handle(&self, failure: Error) -> Outcome {
        Outcome::Translate((self.map)(failure))
    }
}

/// One suppressed failure, as recorded on the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suppressed {
    pub kind: ErrorKind,
    pub message: String,
}

/// Swallow failures of the selected kinds, recording each one.
///
/// Each suppression is recorded once in the journal returned by
/// [`records`](Suppress::records), counted in
/// [`FAILURES_SUPPRESSED`](crate::metrics::FAILURES_SUPPRESSED), and emitted as a
/// `warn` event. Failures of other kinds propagate.
///
/// The default suppresses every kind.
#[derive(Debug)]
pub struct Suppress {
    mask: u8,
    journal: Mutex<Vec<Suppressed>>,
}

impl Default for Suppress {
    fn default() -> Self {
        Self::all()
    }
}

impl Suppress {
    /// Suppress every failure.
    pub fn all() -> Self {
        Self::kinds(ErrorKind::ALL)
    }

    /// Suppress failures of the listed kinds only.
    pub fn kinds(kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        let mask = kinds.into_iter().fold(0, |mask, kind| mask | kind.bit());
        Self {
            mask,
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn suppresses(&self, kind: ErrorKind) -> bool {
        self.mask & kind.bit() != 0
    }

    /// Suppressed failures, oldest first.
    pub fn records(&self) -> Vec<Suppressed> {
        self.journal.lock().clone()
    }

    /// Remove and return the journal.
    pub fn take_records(&self) -> Vec<Suppressed> {
        std::mem::take(&mut *self.journal.lock())
    }
}

impl ExceptionPolicy for Suppress {
    fn handle(&self, failure: Error) -> Outcome {
        let kind = failure.kind();
        if !self.suppresses(kind) {
            return Outcome::Propagate(failure);
        }
        let message = failure.to_string();
        warn!(role = "exception", kind = kind.as_str(), error = %message, "suppressed failure");
        metrics::FAILURES_SUPPRESSED.increment();
        self.journal.lock().push(Suppressed { kind, message });
        Outcome::Suppress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagate() {
        let outcome = Propagate.handle(Error::Request("empty key"));
        assert!(matches!(outcome, Outcome::Propagate(Error::Request("empty key"))));
    }

    #[test]
    fn test_translate() {
        let policy = Translate::new(|e: Error| Error::Server(format!("wrapped: {e}")));
        let outcome = policy.handle(Error::Request("empty key"));
        match outcome {
            Outcome::Translate(Error::Server(msg)) => {
                assert_eq!(msg, "wrapped: invalid request: empty key")
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_suppress_selected_kinds() {
        let policy = Suppress::kinds([ErrorKind::Server]);
        assert!(policy.suppresses(ErrorKind::Server));
        assert!(!policy.suppresses(ErrorKind::Io));

        let outcome = policy.handle(Error::Server("SERVER_ERROR busy".into()));
        assert!(outcome.into_error().is_none());

        let outcome = policy.handle(Error::Request("empty key"));
        assert!(matches!(outcome, Outcome::Propagate(_)));

        assert_eq!(
            policy.records(),
            [Suppressed {
                kind: ErrorKind::Server,
                message: "server error: SERVER_ERROR busy".into(),
            }]
        );
    }

    #[test]
    fn test_suppress_records_each_failure_once() {
        let policy = Suppress::all();
        for _ in 0..3 {
            policy.handle(Error::Request("empty key"));
        }
        assert_eq!(policy.take_records().len(), 3);
        assert!(policy.records().is_empty());
    }

    #[test]
    fn test_default_suppresses_everything() {
        let policy = Suppress::default();
        for kind in ErrorKind::ALL {
            assert!(policy.suppresses(kind));
        }
        assert!(!Suppress::kinds(std::iter::empty()).suppresses(ErrorKind::Io));
    }
}
