// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

/// Classifies an [`Error`] by the party responsible for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The provider reported a failed read. The provider's error is the cause.
    Read,

    /// The provider reported a failed rewind. The provider's error is the cause.
    Rewind,

    /// The provider broke its contract, e.g. by returning more data than requested or
    /// more data than the length it declared.
    Protocol,

    /// The transport used the stream incorrectly, e.g. by reading while another
    /// operation is in flight. This is a programming error on the caller side.
    Misuse,

    /// The pending result was abandoned by `reset()`, by a superseding `init()`
    /// or by teardown of the stream.
    Aborted,
}

impl ErrorKind {
    /// Returns a stable, human-readable name of the error kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "provider read failed",
            Self::Rewind => "provider rewind failed",
            Self::Protocol => "provider protocol violation",
            Self::Misuse => "stream misuse",
            Self::Aborted => "result abandoned",
        }
    }

    /// Returns `true` if the error originates in the provider rather than the transport.
    #[must_use]
    pub fn is_provider_failure(self) -> bool {
        matches!(self, Self::Read | Self::Rewind | Self::Protocol)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error signaled by an upload stream.
///
/// Use [`Error::kind()`] to tell provider failures apart from misuse by the transport.
/// Errors reported by the provider are attached as the cause and are reachable through
/// [`std::error::Error::source()`].
#[ohno::error]
#[display("upload stream: {kind}")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn misuse(reason: &'static str) -> Self {
        Self::caused_by(ErrorKind::Misuse, reason)
    }

    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::caused_by(ErrorKind::Protocol, reason.into())
    }

    pub(crate) fn aborted() -> Self {
        Self::new(ErrorKind::Aborted)
    }
}

/// A `Result` that may contain an [`Error`] from this crate.
pub type Result<T> = std::result::Result<T, Error>;
