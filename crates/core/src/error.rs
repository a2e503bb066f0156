//! Error types for the dispatch engine.
//!
//! Every failure maps onto one of two recovery classes (see [`FailureKind`]):
//! transient transport trouble is retried after a connection refresh, anything
//! else is logged and the single operation is abandoned.

use std::io;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Recovery class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
	/// Timeout or broken connection: refresh the transport and retry.
	Transient,
	/// Anything else: log with diagnostics and move on.
	Opaque,
}

/// Errors raised while building, sending or completing requests.
#[derive(Debug, Error)]
pub enum Error {
	/// The exchange did not finish within the transport's deadline.
	#[error("request timed out: {0}")]
	Timeout(String),

	/// The peer reset or dropped the connection (broken pipe, reset, abort).
	#[error("connection reset: {0}")]
	ConnectionReset(String),

	/// Any other transport failure (DNS, TLS, protocol).
	#[error("transport error: {0}")]
	Transport(String),

	/// The request could not be constructed (bad URL, bad header).
	#[error("invalid request: {0}")]
	InvalidRequest(String),

	/// The transport was shut down.
	#[error("transport closed")]
	Closed,

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Classifies this error for the retry jail.
	pub fn kind(&self) -> FailureKind {
		match self {
			Error::Timeout(_) | Error::ConnectionReset(_) => FailureKind::Transient,
			Error::Io(err) if is_transient_io(err.kind()) => FailureKind::Transient,
			_ => FailureKind::Opaque,
		}
	}

	/// Returns `true` for timeouts and broken connections.
	pub fn is_transient(&self) -> bool {
		self.kind() == FailureKind::Transient
	}
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
	matches!(
		kind,
		io::ErrorKind::TimedOut | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
	)
}

impl From<reqwest::Error> for Error {
	fn from(err: reqwest::Error) -> Self {
		if err.is_timeout() {
			return Error::Timeout(err.to_string());
		}

		let mut source = std::error::Error::source(&err);
		while let Some(cause) = source {
			if let Some(io_err) = cause.downcast_ref::<io::Error>() {
				match io_err.kind() {
					io::ErrorKind::TimedOut => return Error::Timeout(err.to_string()),
					kind if is_transient_io(kind) => return Error::ConnectionReset(err.to_string()),
					_ => {}
				}
			}
			source = cause.source();
		}

		if err.is_builder() {
			return Error::InvalidRequest(err.to_string());
		}
		Error::Transport(err.to_string())
	}
}

impl From<url::ParseError> for Error {
	fn from(err: url::ParseError) -> Self {
		Error::InvalidRequest(err.to_string())
	}
}
