//! Operations: one protocol action bound for a context.

use bytes::Bytes;
use protocol_memcache::{DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_VALUE_LEN, Request, StoreVerb};

use crate::Error;

/// One protocol action. Owns its keys and data so a commit policy can queue it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Get {
        key: Bytes,
    },
    /// Multi-key retrieval; replies carry CAS tokens.
    GetMany {
        keys: Vec<Bytes>,
    },
    Store {
        verb: StoreVerb,
        key: Bytes,
        data: Bytes,
        flags: u32,
        exptime: u32,
    },
    Cas {
        key: Bytes,
        data: Bytes,
        flags: u32,
        exptime: u32,
        cas_unique: u64,
    },
    Delete {
        key: Bytes,
    },
    Incr {
        key: Bytes,
        delta: u64,
    },
    Decr {
        key: Bytes,
        delta: u64,
    },
    Touch {
        key: Bytes,
        exptime: u32,
    },
    FlushAll,
    Version,
}

impl Operation {
    pub fn get(key: impl AsRef<[u8]>) -> Self {
        Operation::Get {
            key: Bytes::copy_from_slice(key.as_ref()),
        }
    }

    pub fn store(verb: StoreVerb, key: impl AsRef<[u8]>, data: Bytes, flags: u32, exptime: u32) -> Self {
        Operation::Store {
            verb,
            key: Bytes::copy_from_slice(key.as_ref()),
            data,
            flags,
            exptime,
        }
    }

    /// A SET with zero flags and no expiry.
    pub fn set(key: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Self {
        Self::store(
            StoreVerb::Set,
            key,
            Bytes::copy_from_slice(data.as_ref()),
            0,
            0,
        )
    }

    pub fn delete(key: impl AsRef<[u8]>) -> Self {
        Operation::Delete {
            key: Bytes::copy_from_slice(key.as_ref()),
        }
    }

    /// Command name, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "get",
            Operation::GetMany { .. } => "gets",
            Operation::Store { verb, .. } => verb.name(),
            Operation::Cas { .. } => "cas",
            Operation::Delete { .. } => "delete",
            Operation::Incr { .. } => "incr",
            Operation::Decr { .. } => "decr",
            Operation::Touch { .. } => "touch",
            Operation::FlushAll => "flush_all",
            Operation::Version => "version",
        }
    }

    /// Whether a commit policy may defer this operation.
    ///
    /// Retrievals and counters always run immediately: the caller needs
    /// their reply.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Operation::Store { .. }
                | Operation::Cas { .. }
                | Operation::Delete { .. }
                | Operation::Touch { .. }
                | Operation::FlushAll
        )
    }

    /// The key this operation targets, if it targets exactly one.
    pub fn key(&self) -> Option<&Bytes> {
        match self {
            Operation::Get { key }
            | Operation::Store { key, .. }
            | Operation::Cas { key, .. }
            | Operation::Delete { key }
            | Operation::Incr { key, .. }
            | Operation::Decr { key, .. }
            | Operation::Touch { key, .. } => Some(key),
            Operation::GetMany { .. } | Operation::FlushAll | Operation::Version => None,
        }
    }

    /// Reject operations the text protocol cannot carry.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Operation::GetMany { keys } => {
                if keys.is_empty() {
                    return Err(Error::Request("no keys"));
                }
                keys.iter().try_for_each(|k| check_key(k))
            }
            Operation::Store { key, data, .. } | Operation::Cas { key, data, .. } => {
                check_key(key)?;
                if data.len() > DEFAULT_MAX_VALUE_LEN {
                    return Err(Error::Request("value too large"));
                }
                Ok(())
            }
            Operation::Get { key }
            | Operation::Delete { key }
            | Operation::Incr { key, .. }
            | Operation::Decr { key, .. }
            | Operation::Touch { key, .. } => check_key(key),
            Operation::FlushAll | Operation::Version => Ok(()),
        }
    }

    /// Borrow this operation as a codec request.
    pub fn as_request(&self) -> Request<'_> {
        match self {
            Operation::Get { key } => Request::Get { key },
            Operation::GetMany { keys } => Request::Gets {
                keys: keys.iter().map(|k| k.as_ref()).collect(),
            },
            Operation::Store {
                verb,
                key,
                data,
                flags,
                exptime,
            } => Request::Store {
                verb: *verb,
                key,
                data,
                flags: *flags,
                exptime: *exptime,
            },
            Operation::Cas {
                key,
                data,
                flags,
                exptime,
                cas_unique,
            } => Request::Cas {
                key,
                data,
                flags: *flags,
                exptime: *exptime,
                cas_unique: *cas_unique,
            },
            Operation::Delete { key } => Request::Delete { key },
            Operation::Incr { key, delta } => Request::Incr { key, delta: *delta },
            Operation::Decr { key, delta } => Request::Decr { key, delta: *delta },
            Operation::Touch { key, exptime } => Request::Touch {
                key,
                exptime: *exptime,
            },
            Operation::FlushAll => Request::FlushAll,
            Operation::Version => Request::Version,
        }
    }
}

fn check_key(key: &[u8]) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::Request("empty key"));
    }
    if key.len() > DEFAULT_MAX_KEY_LEN {
        return Err(Error::Request("key too long"));
    }
    if key.iter().any(|&b| b <= b' ' || b == 0x7f) {
        return Err(Error::Request("key contains whitespace or control bytes"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_validate_keys() {
        assert!(Operation::get("k").validate().is_ok());
        assert!(Operation::get("a".repeat(250)).validate().is_ok());

        for bad in ["", "has space", "tab\tkey", "new\nline", "del\x7f"] {
            let err = Operation::get(bad).validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Request, "key {bad:?}");
        }
        let err = Operation::get("a".repeat(251)).validate().unwrap_err();
        assert!(matches!(err, Error::Request("key too long")));
    }

    #[test]
    fn test_validate_values_and_multi_get() {
        let big = Bytes::from(vec![0u8; DEFAULT_MAX_VALUE_LEN + 1]);
        let op = Operation::store(StoreVerb::Set, "k", big, 0, 0);
        assert!(matches!(op.validate(), Err(Error::Request("value too large"))));

        let op = Operation::GetMany { keys: Vec::new() };
        assert!(matches!(op.validate(), Err(Error::Request("no keys"))));

        let op = Operation::GetMany {
            keys: vec![Bytes::from_static(b"ok"), Bytes::from_static(b"not ok")],
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_is_mutation() {
        assert!(Operation::set("k", "v").is_mutation());
        assert!(Operation::delete("k").is_mutation());
        assert!(Operation::FlushAll.is_mutation());
        assert!(!Operation::get("k").is_mutation());
        assert!(!Operation::Version.is_mutation());
        assert!(
            !Operation::Incr {
                key: Bytes::from_static(b"n"),
                delta: 1
            }
            .is_mutation()
        );
    }

    #[test]
    fn test_as_request_encodes() {
        let mut buf = bytes::BytesMut::new();
        Operation::set("k", "value").as_request().encode(&mut buf);
        assert_eq!(&buf[..], b"set k 0 0 5\r\nvalue\r\n");

        buf.clear();
        let op = Operation::GetMany {
            keys: vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")],
        };
        op.as_request().encode(&mut buf);
        assert_eq!(&buf[..], b"gets a b\r\n");
        assert_eq!(op.name(), "gets");
        assert_eq!(op.key(), None);
    }
}
