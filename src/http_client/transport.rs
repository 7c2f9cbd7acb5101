//! Classification of transport failures.
//!
//! reqwest folds connection failures into one opaque error type; the retry
//! and proxy-health logic needs to know whether the socket was refused,
//! reset, timed out, or whether the origin answered with an error status.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Refused,
    Reset,
    Aborted,
    TimedOut,
    Unreachable,
    Canceled,
    /// The origin (or a proxy) answered with a non-success status.
    Status(u16),
    /// The body stream broke after headers were received.
    Body,
    Other,
}

impl TransportErrorKind {
    /// Classify a reqwest error by walking its source chain.
    pub fn classify(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status(status.as_u16());
        }
        if err.is_timeout() {
            return Self::TimedOut;
        }
        if let Some(io_err) = find_io_error(err) {
            let kind = Self::from_io(io_err);
            if kind != Self::Other {
                return kind;
            }
        }
        if err.is_connect() {
            return Self::Unreachable;
        }
        if err.is_body() || err.is_decode() {
            return Self::Body;
        }
        Self::Other
    }

    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::Reset,
            io::ErrorKind::ConnectionAborted => Self::Aborted,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::AddrNotAvailable => Self::Unreachable,
            io::ErrorKind::Interrupted => Self::Canceled,
            _ => Self::Other,
        }
    }

    /// Errors that happen below HTTP: the request never got a usable answer.
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            Self::Refused
                | Self::Reset
                | Self::Aborted
                | Self::TimedOut
                | Self::Unreachable
                | Self::Canceled
        )
    }

    /// Failures that should count against the proxy that carried the request.
    /// Origin errors such as a 500 never do.
    pub fn is_proxy_attributable(&self) -> bool {
        matches!(
            self,
            Self::Refused | Self::Reset | Self::TimedOut | Self::Unreachable | Self::Status(407)
        )
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => f.write_str("connection refused"),
            Self::Reset => f.write_str("connection reset"),
            Self::Aborted => f.write_str("connection aborted"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Unreachable => f.write_str("host unreachable"),
            Self::Canceled => f.write_str("canceled"),
            Self::Status(code) => write!(f, "HTTP {}", code),
            Self::Body => f.write_str("body stream error"),
            Self::Other => f.write_str("request failed"),
        }
    }
}

fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        current = e.source();
    }
    None
}

/// Failure sending a request or reading its response headers.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl RequestError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            RequestError::Timeout(_) => TransportErrorKind::TimedOut,
            RequestError::Http(e) => TransportErrorKind::classify(e),
        }
    }
}
