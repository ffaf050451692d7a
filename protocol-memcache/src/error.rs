//! Error types for Memcache protocol parsing.

/// Error type for Memcache parsing operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Need more data to complete parsing.
    /// Not fatal: buffer more bytes and parse again.
    #[error("incomplete data")]
    Incomplete,

    /// The bytes do not follow the protocol grammar.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// A numeric field was not an ASCII decimal in range.
    #[error("invalid number")]
    InvalidNumber,

    /// The command verb is not one this codec understands.
    #[error("unknown command")]
    UnknownCommand,

    /// A declared length exceeds the configured limit.
    #[error("{0} exceeds limit")]
    TooLarge(&'static str),
}

impl ParseError {
    /// Returns true if this error indicates more data is needed.
    #[inline]
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ParseError::Incomplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_incomplete() {
        assert!(ParseError::Incomplete.is_incomplete());
        assert!(!ParseError::Protocol("x").is_incomplete());
        assert!(!ParseError::TooLarge("value").is_incomplete());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ParseError::Incomplete.to_string(), "incomplete data");
        assert_eq!(
            ParseError::Protocol("bad format").to_string(),
            "protocol error: bad format"
        );
        assert_eq!(ParseError::TooLarge("key").to_string(), "key exceeds limit");
    }
}
