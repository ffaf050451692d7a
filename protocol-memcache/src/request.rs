//! Client-side request encoding for the Memcache ASCII protocol.

use bytes::{BufMut, BytesMut};

use crate::number::{decimal_len, put_decimal};

/// The storage verbs that share the `<verb> <key> <flags> <exptime> <bytes>` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreVerb {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StoreVerb {
    /// The verb as it appears on the wire.
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            StoreVerb::Set => b"set",
            StoreVerb::Add => b"add",
            StoreVerb::Replace => b"replace",
            StoreVerb::Append => b"append",
            StoreVerb::Prepend => b"prepend",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StoreVerb::Set => "set",
            StoreVerb::Add => "add",
            StoreVerb::Replace => "replace",
            StoreVerb::Append => "append",
            StoreVerb::Prepend => "prepend",
        }
    }
}

/// A request to encode. Borrows keys and values from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// `get <key>\r\n`
    Get { key: &'a [u8] },
    /// `gets <key1> <key2> ...\r\n`, replies carry CAS tokens.
    Gets { keys: Vec<&'a [u8]> },
    /// `<verb> <key> <flags> <exptime> <bytes>\r\n<data>\r\n`
    Store {
        verb: StoreVerb,
        key: &'a [u8],
        data: &'a [u8],
        flags: u32,
        exptime: u32,
    },
    /// `cas <key> <flags> <exptime> <bytes> <cas_unique>\r\n<data>\r\n`
    Cas {
        key: &'a [u8],
        data: &'a [u8],
        flags: u32,
        exptime: u32,
        cas_unique: u64,
    },
    /// `delete <key>\r\n`
    Delete { key: &'a [u8] },
    /// `incr <key> <delta>\r\n`
    Incr { key: &'a [u8], delta: u64 },
    /// `decr <key> <delta>\r\n`
    Decr { key: &'a [u8], delta: u64 },
    /// `touch <key> <exptime>\r\n`
    Touch { key: &'a [u8], exptime: u32 },
    /// `flush_all\r\n`
    FlushAll,
    /// `version\r\n`
    Version,
}

impl Request<'_> {
    /// The command verb, for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Gets { .. } => "gets",
            Request::Store { verb, .. } => verb.name(),
            Request::Cas { .. } => "cas",
            Request::Delete { .. } => "delete",
            Request::Incr { .. } => "incr",
            Request::Decr { .. } => "decr",
            Request::Touch { .. } => "touch",
            Request::FlushAll => "flush_all",
            Request::Version => "version",
        }
    }

    /// Exact number of bytes [`encode`](Self::encode) appends.
    pub fn encoded_len(&self) -> usize {
        match self {
            Request::Get { key } => 4 + key.len() + 2,
            Request::Gets { keys } if keys.is_empty() => 0,
            Request::Gets { keys } => 4 + keys.iter().map(|k| 1 + k.len()).sum::<usize>() + 2,
            Request::Store {
                verb,
                key,
                data,
                flags,
                exptime,
            } => verb.as_bytes().len() + storage_tail_len(key, data, *flags, *exptime),
            Request::Cas {
                key,
                data,
                flags,
                exptime,
                cas_unique,
            } => 3 + storage_tail_len(key, data, *flags, *exptime) + 1 + decimal_len(*cas_unique),
            Request::Delete { key } => 7 + key.len() + 2,
            Request::Incr { key, delta } | Request::Decr { key, delta } => {
                5 + key.len() + 1 + decimal_len(*delta) + 2
            }
            Request::Touch { key, exptime } => {
                6 + key.len() + 1 + decimal_len(u64::from(*exptime)) + 2
            }
            Request::FlushAll => 11,
            Request::Version => 9,
        }
    }

    /// Append the wire form of this request to `buf`.
    ///
    /// A `Gets` with no keys encodes to nothing.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        match self {
            Request::Get { key } => {
                buf.put_slice(b"get ");
                buf.put_slice(key);
                buf.put_slice(b"\r\n");
            }
            Request::Gets { keys } => {
                if keys.is_empty() {
                    return;
                }
                buf.put_slice(b"gets");
                for key in keys {
                    buf.put_u8(b' ');
                    buf.put_slice(key);
                }
                buf.put_slice(b"\r\n");
            }
            Request::Store {
                verb,
                key,
                data,
                flags,
                exptime,
            } => {
                buf.put_slice(verb.as_bytes());
                put_storage_header(buf, key, data, *flags, *exptime);
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Request::Cas {
                key,
                data,
                flags,
                exptime,
                cas_unique,
            } => {
                buf.put_slice(b"cas");
                put_storage_header(buf, key, data, *flags, *exptime);
                buf.put_u8(b' ');
                put_decimal(buf, *cas_unique);
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Request::Delete { key } => {
                buf.put_slice(b"delete ");
                buf.put_slice(key);
                buf.put_slice(b"\r\n");
            }
            Request::Incr { key, delta } => put_counter(buf, b"incr ", key, *delta),
            Request::Decr { key, delta } => put_counter(buf, b"decr ", key, *delta),
            Request::Touch { key, exptime } => {
                buf.put_slice(b"touch ");
                buf.put_slice(key);
                buf.put_u8(b' ');
                put_decimal(buf, u64::from(*exptime));
                buf.put_slice(b"\r\n");
            }
            Request::FlushAll => buf.put_slice(b"flush_all\r\n"),
            Request::Version => buf.put_slice(b"version\r\n"),
        }
    }
}

/// Length of ` <key> <flags> <exptime> <bytes>\r\n<data>\r\n`.
fn storage_tail_len(key: &[u8], data: &[u8], flags: u32, exptime: u32) -> usize {
    1 + key.len()
        + 1
        + decimal_len(u64::from(flags))
        + 1
        + decimal_len(u64::from(exptime))
        + 1
        + decimal_len(data.len() as u64)
        + 2
        + data.len()
        + 2
}

// ` <key> <flags> <exptime> <bytes>`
fn put_storage_header(buf: &mut BytesMut, key: &[u8], data: &[u8], flags: u32, exptime: u32) {
    buf.put_u8(b' ');
    buf.put_slice(key);
    buf.put_u8(b' ');
    put_decimal(buf, u64::from(flags));
    buf.put_u8(b' ');
    put_decimal(buf, u64::from(exptime));
    buf.put_u8(b' ');
    put_decimal(buf, data.len() as u64);
}

fn put_counter(buf: &mut BytesMut, verb: &[u8], key: &[u8], delta: u64) {
    buf.put_slice(verb);
    buf.put_slice(key);
    buf.put_u8(b' ');
    put_decimal(buf, delta);
    buf.put_slice(b"\r\n");
}
