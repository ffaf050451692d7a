//! A memcache client assembled from compile-time policies.
//!
//! Client behavior is split into five roles, each named by a marker type in
//! [`tags`]:
//!
//! | Tag | Trait | Provided policies |
//! |-----|-------|-------------------|
//! | `Connect` | [`ConnectPolicy`](connect::ConnectPolicy) | [`Dedicated`](connect::Dedicated), [`Pooled`](connect::Pooled) |
//! | `Request` | [`RequestPolicy`](request::RequestPolicy) | [`TextRequest`](request::TextRequest) |
//! | `Exception` | [`ExceptionPolicy`](exception::ExceptionPolicy) | [`Propagate`](exception::Propagate), [`Translate`](exception::Translate), [`Suppress`](exception::Suppress) |
//! | `Commit` | [`CommitPolicy`](commit::CommitPolicy) | [`Autocommit`](commit::Autocommit), [`Batched`](commit::Batched) |
//! | `Container` | [`Materialize`](container::Materialize) | [`Plain`](container::Plain), [`Json`](container::Json) |
//!
//! A [`Profile`] binds one policy type per role; a [`Context`] owns one
//! instance of each; a [`Client`] runs typed commands through them. Every
//! call site resolves its policy statically: a client is as direct as one
//! written by hand for that combination, and any combination of policies
//! can be swapped without touching call sites.
//!
//! # Example
//!
//! ```
//! use memcache_policy::commit::Batched;
//! use memcache_policy::connect::{MemoryServer, Pooled};
//! use memcache_policy::container::Json;
//! use memcache_policy::exception::Propagate;
//! use memcache_policy::request::TextRequest;
//! use memcache_policy::{Client, Profile, Status};
//!
//! enum SessionCache {}
//!
//! impl Profile for SessionCache {
//!     type Connect = Pooled<MemoryServer>;
//!     type Request = TextRequest;
//!     type Exception = Propagate;
//!     type Commit = Batched;
//!     type Container = Json;
//! }
//!
//! let server = MemoryServer::new();
//! let client = Client::<SessionCache>::with_connect(Pooled::new(server.clone(), 4));
//!
//! let roles = vec!["admin".to_string(), "ops".to_string()];
//! assert_eq!(client.set("user:1", &roles)?, Status::Queued);
//! assert_eq!(server.command_count(), 0);
//!
//! client.flush()?;
//! let stored: Option<Vec<String>> = client.get("user:1")?;
//! assert_eq!(stored, Some(roles));
//! # Ok::<(), memcache_policy::Error>(())
//! ```

mod client;
mod context;
mod error;
mod operation;
mod resolve;

pub mod commit;
pub mod config;
pub mod connect;
pub mod container;
pub mod exception;
pub mod metrics;
pub mod profile;
pub mod request;
pub mod tags;

pub use client::{Client, Hit, Status};
pub use context::Context;
pub use error::{CommitError, DecodeError, Error, ErrorKind, ProtocolError};
pub use operation::Operation;
pub use protocol_memcache::{Response, StoreVerb};
pub use resolve::{Binds, Bound, Profile, Resolve};
