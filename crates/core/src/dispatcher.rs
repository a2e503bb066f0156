//! Bounded-concurrency request dispatcher.
//!
//! [`Dispatcher::queue`] only records a request; nothing touches the network
//! until [`Dispatcher::run`] is awaited. `run` keeps at most `max_concurrency`
//! exchanges in flight, invokes completion logic as responses arrive and only
//! returns once the queue is empty, including requests queued by completion
//! callbacks during the same run.
//!
//! # Message Flow
//!
//! 1. An issuing operation builds a [`Request`] and calls `queue`
//! 2. `queue` assigns the next id, records the URL as last contacted and stores
//!    the request as pending
//! 3. `run` admits pending requests into the in-flight set up to the ceiling
//! 4. A finished exchange is turned into a [`Response`] and handed to the
//!    completion sink, then to the handlers attached with `on_complete`
//! 5. Transient failures go back into the in-flight set after the retry delay;
//!    other failures are logged by the jail and dropped
//!
//! Responses arrive in completion order, not queue order.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::jail::{Jail, Verdict};
use crate::request::{Request, RequestId, Response, TransportResponse};
use crate::transport::Transport;

/// Callback run once with the response of the request it was attached to.
pub type CompletionHandler = Box<dyn FnOnce(&Response) -> Result<()> + Send>;

type Exchange = Pin<Box<dyn Future<Output = (Arc<Request>, u32, Result<TransportResponse>)> + Send>>;

/// Point-in-time view of the dispatcher, logged when an operation fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
	pub max_concurrency: usize,
	pub pending: usize,
	pub running: usize,
	/// Requests queued since the client was created.
	pub queued: u64,
	pub completed: u64,
	pub last_url: Option<String>,
}

#[derive(Default)]
struct DispatchQueue {
	pending: VecDeque<Arc<Request>>,
	handlers: HashMap<RequestId, Vec<CompletionHandler>>,
	next_id: u64,
	running: usize,
	completed: u64,
	last_url: Option<String>,
}

/// Request queue plus the loop that drains it.
pub struct Dispatcher {
	max_concurrency: usize,
	queue: Mutex<DispatchQueue>,
}

impl Dispatcher {
	pub fn new(max_concurrency: usize) -> Self {
		Self {
			max_concurrency: max_concurrency.max(1),
			queue: Mutex::new(DispatchQueue::default()),
		}
	}

	/// Assigns the next id to `request` and stores it for the next `run`.
	pub fn queue(&self, mut request: Request) -> Arc<Request> {
		let mut queue = self.queue.lock();
		let id = RequestId(queue.next_id);
		queue.next_id += 1;
		request.id = Some(id);
		queue.last_url = Some(request.url.clone());

		debug!(
			target = "probe.dispatch",
			id = id.0,
			url = %request.url,
			method = %request.method,
			params = ?request.params,
			headers = ?request.headers,
			trainable = request.trainable,
			"queued request"
		);

		let request = Arc::new(request);
		queue.pending.push_back(Arc::clone(&request));
		request
	}

	/// Attaches a handler to a queued request. Handlers run in attachment order.
	pub fn on_complete<F>(&self, id: RequestId, handler: F)
	where
		F: FnOnce(&Response) -> Result<()> + Send + 'static,
	{
		self.queue.lock().handlers.entry(id).or_default().push(Box::new(handler));
	}

	pub fn last_url(&self) -> Option<String> {
		self.queue.lock().last_url.clone()
	}

	/// Number of requests queued so far; also the next id to be assigned.
	pub fn request_count(&self) -> u64 {
		self.queue.lock().next_id
	}

	pub fn snapshot(&self) -> DispatchSnapshot {
		let queue = self.queue.lock();
		DispatchSnapshot {
			max_concurrency: self.max_concurrency,
			pending: queue.pending.len(),
			running: queue.running,
			queued: queue.next_id,
			completed: queue.completed,
			last_url: queue.last_url.clone(),
		}
	}

	/// Drops every pending request and its handlers, returning how many were dropped.
	pub fn drain(&self) -> usize {
		let mut queue = self.queue.lock();
		let dropped = queue.pending.len();
		let ids: Vec<RequestId> = queue.pending.drain(..).filter_map(|request| request.id).collect();
		for id in ids {
			queue.handlers.remove(&id);
		}
		dropped
	}

	/// Drives every queued exchange to completion.
	///
	/// `on_response` runs first for each response, followed by the handlers
	/// attached to its request. Both may queue more requests; they are picked
	/// up by this same run.
	pub async fn run<F>(&self, transport: &Arc<dyn Transport>, jail: &Jail, mut on_response: F)
	where
		F: FnMut(&Response),
	{
		let mut in_flight: FuturesUnordered<Exchange> = FuturesUnordered::new();

		loop {
			self.admit(&mut in_flight, transport);

			let Some((request, attempt, result)) = in_flight.next().await else {
				if self.queue.lock().pending.is_empty() {
					break;
				}
				continue;
			};

			match result {
				Ok(raw) => {
					self.queue.lock().running -= 1;
					let response = Response::from_transport(raw, request);
					self.complete(&response, jail, &mut on_response);
				}
				Err(err) => match jail.on_error(&err, &request.url, attempt, || self.snapshot()) {
					Verdict::Retry { attempt, delay } => {
						in_flight.push(exchange(Arc::clone(transport), request, attempt, delay));
					}
					Verdict::Abandon => {
						let mut queue = self.queue.lock();
						queue.running -= 1;
						if let Some(id) = request.id {
							queue.handlers.remove(&id);
						}
					}
				},
			}
		}

		debug!(target = "probe.dispatch", completed = self.queue.lock().completed, "queue drained");
	}

	fn admit(&self, in_flight: &mut FuturesUnordered<Exchange>, transport: &Arc<dyn Transport>) {
		let mut queue = self.queue.lock();
		while in_flight.len() < self.max_concurrency {
			let Some(request) = queue.pending.pop_front() else {
				break;
			};
			queue.running += 1;
			in_flight.push(exchange(Arc::clone(transport), request, 0, Duration::ZERO));
		}
	}

	fn complete<F>(&self, response: &Response, jail: &Jail, on_response: &mut F)
	where
		F: FnMut(&Response),
	{
		let request = &response.request;
		debug!(
			target = "probe.dispatch",
			id = request.id.map(|id| id.0),
			url = %response.effective_url,
			status = response.status,
			method = %request.method,
			trainable = request.trainable,
			"got response"
		);

		on_response(response);

		let handlers = {
			let mut queue = self.queue.lock();
			queue.completed += 1;
			request.id.and_then(|id| queue.handlers.remove(&id)).unwrap_or_default()
		};
		for handler in handlers {
			if let Err(err) = handler(response) {
				jail.abandon(&err, &response.effective_url, || self.snapshot());
			}
		}
	}
}

fn exchange(transport: Arc<dyn Transport>, request: Arc<Request>, attempt: u32, delay: Duration) -> Exchange {
	Box::pin(async move {
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		let result = transport.execute(&request).await;
		(request, attempt, result)
	})
}
