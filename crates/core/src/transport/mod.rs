//! Transport abstraction for executing single HTTP exchanges.
//!
//! The dispatcher never touches sockets. It hands each [`Request`] to a
//! [`Transport`], which performs exactly one exchange (redirects are never
//! followed) and reports the raw [`TransportResponse`] or an [`Error`].
//!
//! [`Error`]: crate::Error

mod http;

use std::future::Future;
use std::pin::Pin;

pub use http::ReqwestTransport;

use crate::error::Result;
use crate::request::{Request, TransportResponse};

/// Boxed future returned by [`Transport::execute`].
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<TransportResponse>> + Send + 'a>>;

/// Capability to perform HTTP exchanges on behalf of the dispatcher.
pub trait Transport: Send + Sync {
	/// Performs one exchange for `request`.
	fn execute<'a>(&'a self, request: &'a Request) -> ExchangeFuture<'a>;

	/// Drops live connections and starts over with the same configuration.
	fn refresh(&self) -> Result<()>;

	/// Releases transport resources. Later exchanges fail with `Error::Closed`.
	fn close(&self) {}
}
