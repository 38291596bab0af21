// Copyright (c) 2019, 2020 Codethink Ltd.
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Error types for manifest generation.
//!
//! Every failure carries a [`FailureKind`] so that a caller running a retry
//! policy can tell transient I/O trouble apart from conditions that will
//! never succeed on a second attempt. Read failures get their kind where the
//! failure is detected; all other variants have a fixed kind.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The whole descriptor computation may be attempted again.
    Retryable,
    /// Retrying cannot help.
    Fatal,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Stream error while hashing or compressing layer content.
    #[error("reading layer content: {source}")]
    ReadFailure {
        kind: FailureKind,
        #[source]
        source: io::Error,
    },

    /// A layer declared a media type that is neither the compressed nor the
    /// uncompressed layer type.
    #[error("unsupported layer media type {0}")]
    UnsupportedEncoding(String),

    #[error("layer chain has {walked} layers but the root filesystem declares {expected}")]
    ChainLengthMismatch { expected: usize, walked: usize },

    #[error("encoding manifest: {0}")]
    SerializationFailure(#[source] serde_json::Error),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("layer not found: {0}")]
    LayerNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("corrupt store: {0}")]
    CorruptStore(String),

    #[error("store I/O error: {0}")]
    Store(#[source] io::Error),
}

impl Error {
    /// Wrap a stream error, classifying it on the spot.
    pub fn read(source: io::Error) -> Self {
        Error::ReadFailure {
            kind: classify(&source),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Error::ReadFailure { kind, .. } => *kind,
            Error::Store(err) => classify(err),
            Error::UnsupportedEncoding(_)
            | Error::ChainLengthMismatch { .. }
            | Error::SerializationFailure(_)
            | Error::InvalidDigest(_)
            | Error::InvalidReference(_)
            | Error::ReferenceNotFound(_)
            | Error::ImageNotFound(_)
            | Error::LayerNotFound(_)
            | Error::InvalidConfig(_)
            | Error::CorruptStore(_) => FailureKind::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Retryable
    }
}

/// Out-of-space, permission and corrupt-data errors are fatal; anything else
/// coming off a stream is treated as transient.
pub fn classify(err: &io::Error) -> FailureKind {
    #[cfg(unix)]
    {
        if err.raw_os_error() == Some(libc::ENOSPC) {
            return FailureKind::Fatal;
        }
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied
        | io::ErrorKind::InvalidData
        | io::ErrorKind::Unsupported => FailureKind::Fatal,
        _ => FailureKind::Retryable,
    }
}

/// Copy an I/O error without losing its OS error code.
pub(crate) fn duplicate(err: &io::Error) -> io::Error {
    match err.raw_os_error() {
        Some(code) => io::Error::from_raw_os_error(code),
        None => io::Error::new(err.kind(), err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_io_is_retryable() {
        let err = Error::read(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.kind(), FailureKind::Retryable);
        assert!(err.is_retryable());

        let err = Error::read(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert!(err.is_retryable());
    }

    #[test]
    fn corrupt_and_denied_are_fatal() {
        let err = Error::read(io::Error::new(io::ErrorKind::InvalidData, "bad gzip"));
        assert_eq!(err.kind(), FailureKind::Fatal);

        let err = Error::read(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert_eq!(err.kind(), FailureKind::Fatal);
    }

    #[cfg(unix)]
    #[test]
    fn out_of_space_is_fatal() {
        let err = Error::read(io::Error::from_raw_os_error(libc::ENOSPC));
        assert_eq!(err.kind(), FailureKind::Fatal);
        assert_eq!(classify(&duplicate(&io::Error::from_raw_os_error(libc::ENOSPC))), FailureKind::Fatal);
    }

    #[test]
    fn fixed_kinds() {
        assert_eq!(
            Error::UnsupportedEncoding("text/plain".into()).kind(),
            FailureKind::Fatal
        );
        assert_eq!(
            Error::ChainLengthMismatch {
                expected: 2,
                walked: 1
            }
            .kind(),
            FailureKind::Fatal
        );
        assert!(Error::Store(io::Error::new(io::ErrorKind::TimedOut, "slow disk")).is_retryable());
    }

    #[test]
    fn duplicate_keeps_kind_and_message() {
        let original = io::Error::new(io::ErrorKind::BrokenPipe, "gone");
        let copy = duplicate(&original);
        assert_eq!(copy.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(copy.to_string(), "gone");
    }
}
