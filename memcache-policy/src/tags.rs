//! The closed set of roles a client configuration must bind.
//!
//! Each tag is an uninhabited enum: it names a role at the type level and
//! can never exist as a value. The [`Tag`] trait is sealed, so the set of
//! roles is fixed by this module.

mod sealed {
    pub trait Sealed {}
}

/// A role in the client pipeline.
pub trait Tag: sealed::Sealed + 'static {
    /// Role name, for diagnostics and log fields only.
    const NAME: &'static str;
}

/// How an endpoint is acquired and released.
#[derive(Debug)]
pub enum Connect {}

/// How failures surface to the caller.
#[derive(Debug)]
pub enum Exception {}

/// How pending mutations are flushed.
#[derive(Debug)]
pub enum Commit {}

/// How a single operation is encoded, sent, and its reply read.
#[derive(Debug)]
pub enum Request {}

/// How stored bytes become caller-typed values.
#[derive(Debug)]
pub enum Container {}

macro_rules! tag {
    ($ty:ident, $name:literal) => {
        impl sealed::Sealed for $ty {}
        impl Tag for $ty {
            const NAME: &'static str = $name;
        }
    };
}

tag!(Connect, "connect");
tag!(Exception, "exception");
tag!(Commit, "commit");
tag!(Request, "request");
tag!(Container, "container");

/// Role names in registry order.
pub const ALL: [&str; 5] = [
    Connect::NAME,
    Exception::NAME,
    Commit::NAME,
    Request::NAME,
    Container::NAME,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(ALL, ["connect", "exception", "commit", "request", "container"]);
    }

    #[test]
    fn test_tags_are_zero_sized_and_uninhabited() {
        assert_eq!(std::mem::size_of::<Connect>(), 0);
        assert_eq!(std::mem::size_of::<Container>(), 0);
        // An uninhabited type's Option has only the `None` state.
        assert!(std::mem::size_of::<Option<Commit>>() == 0);
    }
}
