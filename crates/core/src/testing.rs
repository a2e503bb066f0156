//! In-memory transport for exercising the dispatcher without a network.
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(FakeTransport::new(|request| {
//!     Ok(TransportResponse::ok(&request.url, "hello"))
//! }));
//! let client = HttpClient::builder(ClientConfig::default())
//!     .transport(transport.clone())
//!     .build()?;
//! client.get("http://target.test/", Params::new(), RequestOptions::new());
//! client.run().await;
//! assert_eq!(transport.call_count(), 1);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::request::{Headers, Method, Params, Request, TransportResponse};
use crate::transport::{ExchangeFuture, Transport};

type Responder = dyn Fn(&Request) -> Result<TransportResponse> + Send + Sync;

/// One exchange observed by a [`FakeTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
	pub method: Method,
	pub url: String,
	pub params: Params,
	pub headers: Headers,
	pub trainable: bool,
}

/// Transport whose replies come from a closure.
pub struct FakeTransport {
	responder: Box<Responder>,
	latency: Duration,
	calls: Mutex<Vec<RecordedCall>>,
	refreshes: AtomicUsize,
	active: AtomicUsize,
	peak: AtomicUsize,
	closed: AtomicBool,
}

impl FakeTransport {
	pub fn new<F>(responder: F) -> Self
	where
		F: Fn(&Request) -> Result<TransportResponse> + Send + Sync + 'static,
	{
		Self {
			responder: Box::new(responder),
			latency: Duration::ZERO,
			calls: Mutex::new(Vec::new()),
			refreshes: AtomicUsize::new(0),
			active: AtomicUsize::new(0),
			peak: AtomicUsize::new(0),
			closed: AtomicBool::new(false),
		}
	}

	/// Replies `200 OK` with `body` to every request.
	pub fn always(body: &'static str) -> Self {
		Self::new(move |request| Ok(TransportResponse::ok(&request.url, body)))
	}

	/// Delays every reply, so exchanges overlap.
	#[must_use]
	pub fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = latency;
		self
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}

	/// URLs requested so far, in call order.
	pub fn urls(&self) -> Vec<String> {
		self.calls.lock().iter().map(|call| call.url.clone()).collect()
	}

	pub fn refresh_count(&self) -> usize {
		self.refreshes.load(Ordering::SeqCst)
	}

	/// Highest number of exchanges that were in flight at the same time.
	pub fn peak_concurrency(&self) -> usize {
		self.peak.load(Ordering::SeqCst)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

impl Transport for FakeTransport {
	fn execute<'a>(&'a self, request: &'a Request) -> ExchangeFuture<'a> {
		Box::pin(async move {
			if self.is_closed() {
				return Err(Error::Closed);
			}
			self.calls.lock().push(RecordedCall {
				method: request.method,
				url: request.url.clone(),
				params: request.params.clone(),
				headers: request.headers.clone(),
				trainable: request.trainable,
			});

			let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
			self.peak.fetch_max(active, Ordering::SeqCst);
			if !self.latency.is_zero() {
				tokio::time::sleep(self.latency).await;
			}
			self.active.fetch_sub(1, Ordering::SeqCst);

			(self.responder)(request)
		})
	}

	fn refresh(&self) -> Result<()> {
		self.refreshes.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}
}
