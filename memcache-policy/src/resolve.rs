//! Binding policies to roles, and resolving them at compile time.
//!
//! A client configuration is a type implementing [`Profile`], naming one
//! policy type per role. [`Binds`] maps `(profile, tag)` to that type and
//! [`Resolve`] maps `(context, tag)` to the policy instance the context owns.
//! Both are plain trait lookups: every call site is monomorphized against
//! the bound policy and there is nothing left to decide at run time.
//!
//! A profile must bind every role exactly once. Leaving one out does not
//! build:
//!
//! ```compile_fail,E0046
//! use memcache_policy::commit::Autocommit;
//! use memcache_policy::connect::{Pooled, TcpDialer};
//! use memcache_policy::container::Plain;
//! use memcache_policy::request::TextRequest;
//! use memcache_policy::Profile;
//!
//! enum NoExceptionPolicy {}
//!
//! impl Profile for NoExceptionPolicy {
//!     type Connect = Pooled<TcpDialer>;
//!     type Request = TextRequest;
//!     type Commit = Autocommit;
//!     type Container = Plain;
//! }
//! ```
//!
//! and neither does binding one twice:
//!
//! ```compile_fail,E0201
//! use memcache_policy::commit::{Autocommit, Batched};
//! use memcache_policy::connect::{Pooled, TcpDialer};
//! use memcache_policy::container::Plain;
//! use memcache_policy::exception::Propagate;
//! use memcache_policy::request::TextRequest;
//! use memcache_policy::Profile;
//!
//! enum TwoCommitPolicies {}
//!
//! impl Profile for TwoCommitPolicies {
//!     type Connect = Pooled<TcpDialer>;
//!     type Request = TextRequest;
//!     type Exception = Propagate;
//!     type Commit = Autocommit;
//!     type Commit = Batched;
//!     type Container = Plain;
//! }
//! ```
//!
//! A request policy must be able to drive the connect policy's endpoints:
//!
//! ```compile_fail,E0277
//! use std::io;
//!
//! use memcache_policy::commit::Autocommit;
//! use memcache_policy::connect::{ConnectPolicy, Lease, Pooled, TcpDialer};
//! use memcache_policy::container::Plain;
//! use memcache_policy::exception::Propagate;
//! use memcache_policy::request::RequestPolicy;
//! use memcache_policy::{Error, Operation, Profile, Response};
//!
//! /// Only knows how to talk over an in-memory cursor.
//! struct CursorOnly;
//!
//! impl RequestPolicy<io::Cursor<Vec<u8>>> for CursorOnly {
//!     fn send<C>(&self, _: &mut Lease<'_, C>, _: &Operation) -> Result<Response, Error>
//!     where
//!         C: ConnectPolicy<Endpoint = io::Cursor<Vec<u8>>>,
//!     {
//!         Ok(Response::Ok)
//!     }
//! }
//!
//! enum Mismatched {}
//!
//! impl Profile for Mismatched {
//!     type Connect = Pooled<TcpDialer>;
//!     type Request = CursorOnly;
//!     type Exception = Propagate;
//!     type Commit = Autocommit;
//!     type Container = Plain;
//! }
//! ```

use crate::commit::CommitPolicy;
use crate::connect::ConnectPolicy;
use crate::container::ContainerPolicy;
use crate::context::Context;
use crate::exception::ExceptionPolicy;
use crate::request::RequestPolicy;
use crate::tags::{self, Tag};

/// A client configuration: one policy type per role.
///
/// Profiles are usually uninhabited enums, like tags. There are no defaults;
/// see [`profile`](crate::profile) for ready-made ones.
pub trait Profile: 'static {
    type Connect: ConnectPolicy;
    type Request: RequestPolicy<<Self::Connect as ConnectPolicy>::Endpoint>;
    type Exception: ExceptionPolicy;
    type Commit: CommitPolicy;
    type Container: ContainerPolicy;
}

/// The policy type a profile binds for tag `T`.
pub trait Binds<T: Tag> {
    type Policy;
}

/// The policy type `P` binds for tag `T`.
pub type Bound<P, T> = <P as Binds<T>>::Policy;

/// Access to the policy instance bound for tag `T`.
pub trait Resolve<T: Tag> {
    type Policy;

    fn resolve(&self) -> &Self::Policy;
}

macro_rules! bind {
    ($tag:ident, $field:ident) => {
        impl<P: Profile> Binds<tags::$tag> for P {
            type Policy = P::$tag;
        }

        impl<P: Profile> Resolve<tags::$tag> for Context<P> {
            type Policy = P::$tag;

            #[inline]
            fn resolve(&self) -> &P::$tag {
                &self.$field
            }
        }
    };
}

bind!(Connect, connect);
bind!(Request, request);
bind!(Exception, exception);
bind!(Commit, commit);
bind!(Container, container);
