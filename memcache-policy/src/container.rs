//! The `container` role: stored bytes to caller types and back.

use bytes::Bytes;
use protocol_memcache::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::Error;
use crate::error::DecodeError;

/// An item as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawValue {
    pub data: Bytes,
    pub flags: u32,
    /// CAS token, present on multi-key retrievals.
    pub cas: Option<u64>,
}

impl RawValue {
    pub fn new(data: impl Into<Bytes>, flags: u32) -> Self {
        Self {
            data: data.into(),
            flags,
            cas: None,
        }
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        Self {
            data: value.data,
            flags: value.flags,
            cas: value.cas,
        }
    }
}

/// Behavior bound to the [`Container`](crate::tags::Container) tag.
///
/// The types a container handles are declared by its [`Materialize`] impls.
pub trait ContainerPolicy {}

/// Conversion between `T` and its stored form.
///
/// `materialize` either returns a whole value or fails with
/// [`Error::Decode`]; it never returns a partially decoded value. Neither
/// method has side effects.
pub trait Materialize<T>: ContainerPolicy {
    fn encode(&self, value: &T) -> Result<RawValue, Error>;

    fn materialize(&self, raw: RawValue) -> Result<T, Error>;
}

/// Raw bytes, UTF-8 strings, and integers as ASCII decimal.
///
/// Integers use the representation `incr` and `decr` operate on, so a
/// counter written with `set` can be incremented server-side. Flags are
/// always 0 and are not checked on read.
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl ContainerPolicy for Plain {}

impl Materialize<Bytes> for Plain {
    fn encode(&self, value: &Bytes) -> Result<RawValue, Error> {
        Ok(RawValue::new(value.clone(), 0))
    }

    fn materialize(&self, raw: RawValue) -> Result<Bytes, Error> {
        Ok(raw.data)
    }
}

impl Materialize<Vec<u8>> for Plain {
    fn encode(&self, value: &Vec<u8>) -> Result<RawValue, Error> {
        Ok(RawValue::new(Bytes::copy_from_slice(value), 0))
    }

    fn materialize(&self, raw: RawValue) -> Result<Vec<u8>, Error> {
        Ok(raw.data.to_vec())
    }
}

impl Materialize<String> for Plain {
    fn encode(&self, value: &String) -> Result<RawValue, Error> {
        Ok(RawValue::new(Bytes::copy_from_slice(value.as_bytes()), 0))
    }

    fn materialize(&self, raw: RawValue) -> Result<String, Error> {
        let s = std::str::from_utf8(&raw.data).map_err(DecodeError::from)?;
        Ok(s.to_owned())
    }
}

macro_rules! decimal {
    ($($ty:ty),*) => {
        $(
            impl Materialize<$ty> for Plain {
                fn encode(&self, value: &$ty) -> Result<RawValue, Error> {
                    Ok(RawValue::new(value.to_string(), 0))
                }

                fn materialize(&self, raw: RawValue) -> Result<$ty, Error> {
                    std::str::from_utf8(&raw.data)
                        .ok()
                        .and_then(|s| s.parse::<$ty>().ok())
                        .ok_or(Error::Decode(DecodeError::Number(stringify!($ty))))
                }
            }
        )*
    };
}

decimal!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

/// Any serde type, as JSON.
///
/// Values are written with [`Json::FLAGS`] and reads reject items carrying
/// other flags, so a JSON reader never misreads a plain value that happens
/// to parse.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json;

impl Json {
    pub const FLAGS: u32 = 0x4a53;
}

impl ContainerPolicy for Json {}

impl<T: Serialize + DeserializeOwned> Materialize<T> for Json {
    fn encode(&self, value: &T) -> Result<RawValue, Error> {
        let data = serde_json::to_vec(value).map_err(|e| {
            debug!(role = "container", error = %e, "value does not serialize");
            Error::Request("value is not representable as JSON")
        })?;
        Ok(RawValue::new(data, Self::FLAGS))
    }

    fn materialize(&self, raw: RawValue) -> Result<T, Error> {
        if raw.flags != Self::FLAGS {
            return Err(DecodeError::Flags {
                expected: Self::FLAGS,
                found: raw.flags,
            }
            .into());
        }
        Ok(serde_json::from_slice(&raw.data).map_err(DecodeError::from)?)
    }
}
