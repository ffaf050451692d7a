//! Server-side command parsing for the Memcache ASCII protocol.

use crate::error::ParseError;
use crate::find_crlf;
use crate::number::{parse_u32, parse_u64, parse_usize};
use crate::request::StoreVerb;

/// Default maximum key size in bytes (memcached default is 250).
pub const DEFAULT_MAX_KEY_LEN: usize = 250;

/// Default maximum value size in bytes (memcached default is 1MB).
pub const DEFAULT_MAX_VALUE_LEN: usize = 1024 * 1024;

/// Default maximum number of keys in one retrieval command.
pub const DEFAULT_MAX_KEYS: usize = 1024;

/// Size limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_key_len: usize,
    pub max_value_len: usize,
    pub max_keys: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

impl Limits {
    pub const fn new() -> Self {
        Self {
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
            max_keys: DEFAULT_MAX_KEYS,
        }
    }

    pub const fn max_key_len(mut self, len: usize) -> Self {
        self.max_key_len = len;
        self
    }

    pub const fn max_value_len(mut self, len: usize) -> Self {
        self.max_value_len = len;
        self
    }

    pub const fn max_keys(mut self, count: usize) -> Self {
        self.max_keys = count;
        self
    }

    /// Longest command line these limits admit: `gets` plus `max_keys` keys.
    pub const fn max_line_len(&self) -> usize {
        5 + (self.max_key_len + 1) * self.max_keys
    }
}

/// A parsed command borrowing keys and data from the input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `get`/`gets` with one or more keys.
    Retrieve { keys: Vec<&'a [u8]>, with_cas: bool },
    Store {
        verb: StoreVerb,
        key: &'a [u8],
        flags: u32,
        exptime: u32,
        data: &'a [u8],
    },
    Cas {
        key: &'a [u8],
        flags: u32,
        exptime: u32,
        data: &'a [u8],
        cas_unique: u64,
    },
    Delete { key: &'a [u8] },
    Incr { key: &'a [u8], delta: u64 },
    Decr { key: &'a [u8], delta: u64 },
    Touch { key: &'a [u8], exptime: u32 },
    FlushAll,
    Version,
    Quit,
}

impl<'a> Command<'a> {
    /// Parse one command with the default limits.
    ///
    /// Returns the command and the number of bytes consumed.
    #[inline]
    pub fn parse(buffer: &'a [u8]) -> Result<(Self, usize), ParseError> {
        Self::parse_with_limits(buffer, &Limits::default())
    }

    pub fn parse_with_limits(
        buffer: &'a [u8],
        limits: &Limits,
    ) -> Result<(Self, usize), ParseError> {
        let Some(line_end) = find_crlf(buffer) else {
            if buffer.len() > limits.max_line_len() {
                return Err(ParseError::TooLarge("command line"));
            }
            return Err(ParseError::Incomplete);
        };
        let line = &buffer[..line_end];
        let consumed = line_end + 2;
        let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());
        let verb = parts.next().ok_or(ParseError::Protocol("empty command"))?;

        let command = match verb {
            b"get" | b"gets" => {
                let keys: Vec<&[u8]> = parts.collect();
                if keys.is_empty() {
                    return Err(ParseError::Protocol("retrieval requires a key"));
                }
                if keys.len() > limits.max_keys {
                    return Err(ParseError::TooLarge("key count"));
                }
                for key in &keys {
                    check_key(key, limits)?;
                }
                Command::Retrieve {
                    keys,
                    with_cas: verb == b"gets",
                }
            }
            b"set" | b"add" | b"replace" | b"append" | b"prepend" | b"cas" => {
                let key = check_key(parts.next().unwrap_or_default(), limits)?;
                let flags = parse_u32(parts.next().unwrap_or_default())?;
                let exptime = parse_u32(parts.next().unwrap_or_default())?;
                let len = parse_usize(parts.next().unwrap_or_default())?;
                if len > limits.max_value_len {
                    return Err(ParseError::TooLarge("value"));
                }
                let cas_unique = if verb == b"cas" {
                    Some(parse_u64(parts.next().unwrap_or_default())?)
                } else {
                    None
                };

                let end = consumed + len;
                if buffer.len() < end + 2 {
                    return Err(ParseError::Incomplete);
                }
                if &buffer[end..end + 2] != b"\r\n" {
                    return Err(ParseError::Protocol("missing data terminator"));
                }
                let data = &buffer[consumed..end];
                let command = match (cas_unique, store_verb(verb)) {
                    (Some(cas_unique), _) => Command::Cas {
                        key,
                        flags,
                        exptime,
                        data,
                        cas_unique,
                    },
                    (None, Some(verb)) => Command::Store {
                        verb,
                        key,
                        flags,
                        exptime,
                        data,
                    },
                    (None, None) => return Err(ParseError::UnknownCommand),
                };
                return Ok((command, end + 2));
            }
            b"delete" => Command::Delete {
                key: check_key(parts.next().unwrap_or_default(), limits)?,
            },
            b"incr" | b"decr" => {
                let key = check_key(parts.next().unwrap_or_default(), limits)?;
                let delta = parse_u64(parts.next().unwrap_or_default())?;
                if verb == b"incr" {
                    Command::Incr { key, delta }
                } else {
                    Command::Decr { key, delta }
                }
            }
            b"touch" => {
                let key = check_key(parts.next().unwrap_or_default(), limits)?;
                let exptime = parse_u32(parts.next().unwrap_or_default())?;
                Command::Touch { key, exptime }
            }
            b"flush_all" => Command::FlushAll,
            b"version" => Command::Version,
            b"quit" => Command::Quit,
            _ => return Err(ParseError::UnknownCommand),
        };
        Ok((command, consumed))
    }

    /// The command verb, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Retrieve { with_cas: false, .. } => "get",
            Command::Retrieve { with_cas: true, .. } => "gets",
            Command::Store { verb, .. } => verb.name(),
            Command::Cas { .. } => "cas",
            Command::Delete { .. } => "delete",
            Command::Incr { .. } => "incr",
            Command::Decr { .. } => "decr",
            Command::Touch { .. } => "touch",
            Command::FlushAll => "flush_all",
            Command::Version => "version",
            Command::Quit => "quit",
        }
    }
}

fn store_verb(verb: &[u8]) -> Option<StoreVerb> {
    match verb {
        b"set" => Some(StoreVerb::Set),
        b"add" => Some(StoreVerb::Add),
        b"replace" => Some(StoreVerb::Replace),
        b"append" => Some(StoreVerb::Append),
        b"prepend" => Some(StoreVerb::Prepend),
        _ => None,
    }
}

fn check_key<'a>(key: &'a [u8], limits: &Limits) -> Result<&'a [u8], ParseError> {
    if key.is_empty() {
        return Err(ParseError::Protocol("missing key"));
    }
    if key.len() > limits.max_key_len {
        return Err(ParseError::TooLarge("key"));
    }
    Ok(key)
}
