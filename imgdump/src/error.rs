//! Error types shared by the decoders.
//!
//! There are three severities of failure. Failing to read the input file at all, or failing to
//! read the mandatory header of a recognized format, is reported through `anyhow::Error` and ends
//! the run. Everything below that is a [`LocalError`], which is stored inside the record that
//! could not be decoded so that its siblings can still be shown.

use std::fmt;

/// Zero-sized type for representing a read past the end of a cursor's window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParserError;

impl ParserError {
    /// Constructor for ParserError, also logs an event. This is useful for setting breakpoints.
    #[cfg_attr(debug_assertions, inline(never))]
    #[cfg_attr(not(debug_assertions), inline(always))]
    pub fn new() -> Self {
        #[cfg(debug_assertions)]
        {
            tracing::debug!("ParserError");
        }
        Self
    }
}

impl Default for ParserError {
    fn default() -> Self {
        Self::new()
    }
}

impl std::error::Error for ParserError {}

impl fmt::Display for ParserError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("Parsing error")
    }
}

/// A failure to decode one record, directory or string. The surrounding structure stays intact.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LocalError {
    /// A read fell outside the input.
    OutOfBounds,
    /// A count or length field claims more data than its container holds.
    Overrun {
        /// What was being read
        what: &'static str,
    },
    /// A magic number did not match.
    BadSignature {
        /// What was expected
        what: &'static str,
    },
    /// A structure is inconsistent, e.g. a chain revisits a node.
    Invalid {
        /// What is wrong
        what: &'static str,
    },
}

impl LocalError {
    /// Shorthand for [`LocalError::Overrun`].
    pub fn overrun(what: &'static str) -> Self {
        Self::Overrun { what }
    }

    /// Shorthand for [`LocalError::BadSignature`].
    pub fn bad_signature(what: &'static str) -> Self {
        Self::BadSignature { what }
    }

    /// Shorthand for [`LocalError::Invalid`].
    pub fn invalid(what: &'static str) -> Self {
        Self::Invalid { what }
    }
}

impl From<ParserError> for LocalError {
    fn from(_: ParserError) -> Self {
        Self::OutOfBounds
    }
}

impl std::error::Error for LocalError {}

impl fmt::Display for LocalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::OutOfBounds => f.write_str("<out of bounds>"),
            Self::Overrun { what } => write!(f, "<{what}: count exceeds available data>"),
            Self::BadSignature { what } => write!(f, "<bad signature: expected {what}>"),
            Self::Invalid { what } => write!(f, "<invalid: {what}>"),
        }
    }
}

/// The result of decoding something that is allowed to fail without stopping its parent.
pub type LocalResult<T> = Result<T, LocalError>;

/// Runs one locally isolated decode step. A failure is logged and handed back to be stored in
/// the parent record.
pub(crate) fn isolate<T>(what: &str, f: impl FnOnce() -> LocalResult<T>) -> LocalResult<T> {
    let r = f();
    if let Err(e) = &r {
        tracing::warn!("{what}: {e}");
    }
    r
}
