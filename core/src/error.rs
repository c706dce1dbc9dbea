//! Error types for remote transactions.
//!
//! # Design
//! Each variant is one failure class of `Transaction::send`. Variants raised
//! while a transaction is live carry an `ErrorReport` so the caller gets the
//! request and response state without re-deriving it. `location` names the
//! operation that failed.

use std::collections::BTreeMap;
use std::fmt;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Boxed error returned by options, transports and queues.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by `Transaction` and the queue consumer.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input the caller must fix, e.g. a bearer-capability URL
    /// without a token.
    #[error("{location}: {message}")]
    Validation { location: &'static str, message: String },

    /// The request could not be assembled (missing method, bad URL).
    #[error("{location}: unable to create HTTP request: {message}")]
    Request {
        location: &'static str,
        message: String,
        report: Box<ErrorReport>,
    },

    /// The request body could not be serialized or read.
    #[error("{location}: unable to encode request body")]
    Encoding {
        location: &'static str,
        #[source]
        source: BoxError,
        report: Box<ErrorReport>,
    },

    #[error("{location}: unsupported Content-Type {content_type:?}")]
    UnsupportedContentType {
        location: &'static str,
        content_type: String,
        report: Box<ErrorReport>,
    },

    /// A textual response was aimed at a structured target.
    #[error("{location}: {content_type:?} must be read into a string, byte buffer or writer")]
    UnsupportedTarget {
        location: &'static str,
        content_type: String,
        report: Box<ErrorReport>,
    },

    /// A response body or serialized transaction could not be decoded.
    #[error("{location}: unable to decode {format} body")]
    Decoding {
        location: &'static str,
        format: &'static str,
        #[source]
        source: BoxError,
        report: Box<ErrorReport>,
    },

    /// The transport failed before a response arrived.
    #[error("{location}: error executing HTTP request")]
    Transport {
        location: &'static str,
        #[source]
        source: BoxError,
        report: Box<ErrorReport>,
    },

    /// The remote server answered outside 200-299.
    #[error("{location}: error returned by remote service: {status}")]
    RemoteService {
        location: &'static str,
        status: u16,
        report: Box<ErrorReport>,
        /// Set when the body could not be decoded into the failure target.
        failure_decode: Option<Box<Error>>,
    },

    #[error("{location}: unable to read response body")]
    ResponseRead {
        location: &'static str,
        status: u16,
        #[source]
        source: io::Error,
        report: Box<ErrorReport>,
    },

    #[error("{location}: unable to publish transaction to queue")]
    QueuePublish {
        location: &'static str,
        #[source]
        source: BoxError,
    },

    /// A `before_request` or `after_request` hook returned an error.
    #[error("{location}: {phase} option failed")]
    OptionFailed {
        location: &'static str,
        phase: OptionPhase,
        #[source]
        source: BoxError,
        /// Present for `after_request` hooks, which run once a response exists.
        report: Option<Box<ErrorReport>>,
    },
}

/// Pipeline stage whose hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionPhase {
    BeforeRequest,
    AfterRequest,
}

impl fmt::Display for OptionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionPhase::BeforeRequest => f.write_str("config"),
            OptionPhase::AfterRequest => f.write_str("response"),
        }
    }
}

impl Error {
    /// HTTP-style classification: the remote status where one applies, 400
    /// for caller mistakes, 500 for everything internal.
    pub fn code(&self) -> u16 {
        match self {
            Error::RemoteService { status, .. } => *status,
            Error::ResponseRead { status, .. } if *status != 0 => *status,
            Error::Validation { .. } | Error::UnsupportedTarget { .. } => 400,
            Error::OptionFailed { source, .. } => source
                .downcast_ref::<Error>()
                .map_or(500, Error::code),
            _ => 500,
        }
    }

    pub fn report(&self) -> Option<&ErrorReport> {
        match self {
            Error::Request { report, .. }
            | Error::Encoding { report, .. }
            | Error::UnsupportedContentType { report, .. }
            | Error::UnsupportedTarget { report, .. }
            | Error::Decoding { report, .. }
            | Error::Transport { report, .. }
            | Error::RemoteService { report, .. }
            | Error::ResponseRead { report, .. } => Some(&**report),
            Error::OptionFailed { report, .. } => report.as_deref(),
            _ => None,
        }
    }

    /// Whether sending the same transaction again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::QueuePublish { .. } => true,
            Error::RemoteService { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Snapshot of a transaction's request and response, attached to errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub url: String,
    pub request: RequestReport,
    pub response: ResponseReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestReport {
    pub method: String,
    pub header: BTreeMap<String, String>,
    pub body: String,
}

/// Response half of an `ErrorReport`; zero-valued when no response exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReport {
    pub status_code: u16,
    pub status: String,
    pub header: Vec<(String, String)>,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(status: u16) -> Error {
        Error::RemoteService {
            location: "test",
            status,
            report: Box::default(),
            failure_decode: None,
        }
    }

    #[test]
    fn remote_errors_use_the_response_status() {
        assert_eq!(remote(404).code(), 404);
        assert!(!remote(404).is_retryable());
        assert!(remote(503).is_retryable());
        assert!(remote(429).is_retryable());
    }

    #[test]
    fn option_errors_inherit_the_wrapped_code() {
        let err = Error::OptionFailed {
            location: "test",
            phase: OptionPhase::BeforeRequest,
            source: Box::new(Error::Validation {
                location: "inner",
                message: "bad".to_string(),
            }),
            report: None,
        };
        assert_eq!(err.code(), 400);
        assert!(err.report().is_none());
        assert_eq!(err.to_string(), "test: config option failed");
    }

    #[test]
    fn report_serializes_with_camel_case_status() {
        let report = ErrorReport {
            url: "http://example.com".to_string(),
            response: ResponseReport {
                status_code: 500,
                ..ResponseReport::default()
            },
            ..ErrorReport::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["response"]["statusCode"], 500);
        assert_eq!(json["url"], "http://example.com");
    }
}
