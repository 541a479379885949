//! Error types for Millrace.

use crate::element::PadRef;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias using Millrace's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Millrace operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A stream contract was violated (buffer before caps, demand exceeded,
    /// caps mismatch, negative demand). Fatal to the element.
    #[error("contract violation in element `{element}`: {message}")]
    Contract {
        /// Element that violated the contract.
        element: String,
        /// Description of the violation.
        message: String,
    },

    /// An element callback returned an error.
    #[error("callback `{callback}` of element `{element}` failed: {reason}")]
    Callback {
        /// Element whose callback failed.
        element: String,
        /// Name of the failed callback.
        callback: &'static str,
        /// Failure description.
        reason: String,
    },

    /// A push-mode consumer fell too far behind and the producer was killed.
    #[error(
        "toilet overflow on pad `{pad}` of element `{element}`: \
         {size} units buffered, capacity {capacity}"
    )]
    ToiletOverflow {
        /// Producing element (the one that dies).
        element: String,
        /// Output pad the overflow was detected on.
        pad: PadRef,
        /// Buffered units at the moment of overflow.
        size: i64,
        /// Configured capacity of the toilet.
        capacity: i64,
    },

    /// Pad linking failed; pipeline startup aborts.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// A pad reference was not registered in the element's pad model.
    ///
    /// This is a programmer error and crashes the element.
    #[error("unknown pad `{pad}` in element `{element}`")]
    UnknownPad {
        /// Element the lookup happened in.
        element: String,
        /// The unregistered reference.
        pad: PadRef,
    },

    /// A child actor died unexpectedly; the parent shuts down.
    #[error("shutdown: child `{child}` crashed ({reason})")]
    ChildCrash {
        /// Name of the crashed child.
        child: String,
        /// Why it went down.
        reason: ExitReason,
    },

    /// The pipeline task itself failed (panicked or was aborted).
    #[error("pipeline task failed: {0}")]
    Runtime(String),
}

impl Error {
    /// Shorthand for a [`Error::Contract`] value.
    pub(crate) fn contract(element: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Contract {
            element: element.into(),
            message: message.into(),
        }
    }
}

/// Why pad linking was rejected.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    /// A link endpoint names a child the parent does not have.
    #[error("link endpoint names unknown child `{child}`")]
    UnknownChild {
        /// The unknown child name.
        child: String,
    },

    /// A link endpoint names a pad the child does not declare.
    #[error("child `{child}` has no pad `{pad}`")]
    NoSuchPad {
        /// Child the pad was looked up on.
        child: String,
        /// The missing pad.
        pad: PadRef,
    },

    /// The `from` end of a link must be an output pad and the `to` end an
    /// input pad.
    #[error("pad `{pad}` of `{child}` has the wrong direction for this end of the link")]
    WrongDirection {
        /// Child owning the pad.
        child: String,
        /// The offending pad.
        pad: PadRef,
    },

    /// A pull output cannot feed a push input.
    #[error("cannot link pull output `{output}` to push input `{input}`")]
    ModeMismatch {
        /// Output pad of the link.
        output: PadRef,
        /// Input pad of the link.
        input: PadRef,
    },

    /// A static pad can take part in at most one link.
    #[error("pad `{pad}` of `{child}` is already linked")]
    AlreadyLinked {
        /// Child owning the pad.
        child: String,
        /// The pad that is already in use.
        pad: PadRef,
    },

    /// Two children in one spec share a name.
    #[error("duplicate child name `{name}`")]
    DuplicateChild {
        /// The duplicated name.
        name: String,
    },

    /// A link targets a bin pad that no internal link binds to a child.
    #[error("bin pad `{pad}` is not bound by any internal link")]
    UnboundBinPad {
        /// The unbound proxy pad.
        pad: PadRef,
    },

    /// An `itself` endpoint was used outside a bin's internal spec.
    #[error("`itself` link endpoints are only valid inside a bin")]
    ItselfOutsideBin,

    /// The link handshake did not finish within the configured timeout.
    #[error("linking timed out before all endpoints responded")]
    Timeout,
}

/// Reason a child actor went down, as observed by its parent.
#[derive(Debug, Clone)]
pub enum ExitReason {
    /// The actor finished its shutdown path normally.
    Normal,
    /// The actor returned an error (contract violation, callback failure).
    Failure(Arc<Error>),
    /// The actor was forcefully killed (toilet overflow, abort on timeout).
    Killed,
    /// The actor panicked.
    Panicked,
}

impl ExitReason {
    /// True for every reason except a normal exit.
    pub fn is_crash(&self) -> bool {
        !matches!(self, ExitReason::Normal)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::Failure(e) => write!(f, "failure: {e}"),
            ExitReason::Killed => write!(f, "killed"),
            ExitReason::Panicked => write!(f, "panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_message_mentions_element() {
        let err = Error::contract("src", "cannot send buffer: caps were not sent");
        let text = err.to_string();
        assert!(text.contains("src"));
        assert!(text.contains("caps were not sent"));
    }

    #[test]
    fn test_exit_reason_crash_classification() {
        assert!(!ExitReason::Normal.is_crash());
        assert!(ExitReason::Killed.is_crash());
        assert!(ExitReason::Panicked.is_crash());
        let failure = ExitReason::Failure(Arc::new(Error::contract("a", "b")));
        assert!(failure.is_crash());
    }

    #[test]
    fn test_link_error_display() {
        let err = LinkError::UnknownChild {
            child: "mixer".into(),
        };
        assert_eq!(err.to_string(), "link endpoint names unknown child `mixer`");
    }
}
