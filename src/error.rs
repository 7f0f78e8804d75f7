// src/error.rs
//
// Unified error handling for casaba.
// Uses thiserror for simple, type-safe error handling.
//
// Error taxonomy:
// - Unsupported*: the request asks for something this backend cannot do
// - Backend*: an external tool misbehaved
// - SourceIo / Decode / Encode: the bytes themselves were the problem

use std::borrow::Cow;
use thiserror::Error;

/// casaba error types.
///
/// All errors are type-safe and provide clear, actionable messages.
/// No numeric error codes - just clear error variants.
#[derive(Debug, Error)]
pub enum CasabaError {
    /// The backend cannot decode the declared source format at all.
    #[error("Unsupported source format: {format}")]
    UnsupportedSourceFormat { format: Cow<'static, str> },

    /// The requested output format is not in this backend's reported set
    /// for the current source format.
    #[error("Unsupported output format: {format}")]
    UnsupportedOutputFormat { format: Cow<'static, str> },

    /// An external process exited non-zero with non-empty diagnostic output.
    /// The diagnostic text is attached verbatim.
    #[error("Backend '{backend}' failed: {stderr}")]
    BackendInvocationFailure {
        backend: Cow<'static, str>,
        stderr: String,
    },

    /// A metadata-only probe produced output that could not be parsed into
    /// source geometry. Usually signals a version mismatch in the tool.
    #[error("Backend '{backend}' produced unparseable output: {message}")]
    BackendProtocolError {
        backend: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    /// The input stream or file could not be read.
    #[error("Failed to read source '{path}': {source}")]
    SourceIo {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },
}

// Constructor helpers
impl CasabaError {
    pub fn unsupported_source_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedSourceFormat {
            format: format.into(),
        }
    }

    pub fn unsupported_output_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOutputFormat {
            format: format.into(),
        }
    }

    pub fn backend_invocation_failure(
        backend: impl Into<Cow<'static, str>>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::BackendInvocationFailure {
            backend: backend.into(),
            stderr: stderr.into(),
        }
    }

    pub fn backend_protocol_error(
        backend: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::BackendProtocolError {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn source_io(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::SourceIo {
            path: path.into(),
            source,
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is recoverable (the caller can fix the request).
    ///
    /// Unsupported-format and invalid-argument errors are the request's
    /// fault; backend and codec failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSourceFormat { .. }
                | Self::UnsupportedOutputFormat { .. }
                | Self::InvalidArgument { .. }
        )
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, CasabaError>;
