//! The client handle that ties session, dispatcher, jail and detector together.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::cookie::cookie_header_string;
use crate::dispatcher::{DispatchSnapshot, Dispatcher};
use crate::error::{Error, Result};
use crate::jail::{FailureRecord, FailureStats, Jail, RetryPolicy};
use crate::not_found::NotFoundDetector;
use crate::request::{CookieJar, Headers, MARKER_PARAM, Params, Request, RequestOptions, Response};
use crate::session::{COOKIE_HEADER, SessionState};
use crate::training::{self, Completion, NoopTrainer, Trainer};
use crate::transport::{ReqwestTransport, Transport};

struct Inner {
	config: ClientConfig,
	transport: Arc<dyn Transport>,
	trainer: Arc<dyn Trainer>,
	session: Mutex<SessionState>,
	dispatcher: Dispatcher,
	jail: Jail,
	detector: NotFoundDetector,
}

/// Handle to one scanning session against a target.
///
/// Cloning is cheap and every clone shares the same queue, session and
/// baselines, so completion handlers can capture a clone and issue follow-up
/// requests while [`HttpClient::run`] is draining the queue.
///
/// Issuing operations never fail loudly: a request that cannot be built is
/// logged by the jail and `None` is returned.
#[derive(Clone)]
pub struct HttpClient {
	inner: Arc<Inner>,
}

/// Builder for [`HttpClient`] allowing a custom transport or trainer.
pub struct HttpClientBuilder {
	config: ClientConfig,
	transport: Option<Arc<dyn Transport>>,
	trainer: Option<Arc<dyn Trainer>>,
}

impl HttpClientBuilder {
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn trainer(mut self, trainer: Arc<dyn Trainer>) -> Self {
		self.trainer = Some(trainer);
		self
	}

	pub fn build(self) -> Result<HttpClient> {
		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::new(&self.config)?),
		};
		let trainer = self.trainer.unwrap_or_else(|| Arc::new(NoopTrainer));

		info!(
			target = "probe.dispatch",
			max_concurrency = self.config.concurrency(),
			max_retries = self.config.retry.max_retries,
			keying = ?self.config.not_found_keying,
			"client ready"
		);

		Ok(HttpClient {
			inner: Arc::new(Inner {
				dispatcher: Dispatcher::new(self.config.concurrency()),
				jail: Jail::new(RetryPolicy::from(&self.config.retry), Arc::clone(&transport)),
				detector: NotFoundDetector::new(self.config.not_found_keying),
				session: Mutex::new(SessionState::new()),
				transport,
				trainer,
				config: self.config,
			}),
		})
	}
}

impl HttpClient {
	/// Client over the reqwest transport with a no-op trainer.
	pub fn new(config: ClientConfig) -> Result<Self> {
		Self::builder(config).build()
	}

	pub fn builder(config: ClientConfig) -> HttpClientBuilder {
		HttpClientBuilder {
			config,
			transport: None,
			trainer: None,
		}
	}

	/// Queues a GET. Unless `options.suppress_marker` is set, the marker
	/// parameter is added to `params` with an empty value.
	pub fn get(&self, url: &str, params: Params, options: RequestOptions) -> Option<Arc<Request>> {
		self.issue(url, options, || {
			let mut params = params.clone();
			if !options.suppress_marker {
				params.insert(MARKER_PARAM.to_string(), String::new());
			}
			Request::get(url, params, self.init_headers())
		})
	}

	/// Queues a form POST.
	pub fn post(&self, url: &str, params: Params, options: RequestOptions) -> Option<Arc<Request>> {
		self.issue(url, options, || Request::post(url, params.clone(), self.init_headers()))
	}

	/// Queues a GET carrying the session cookies with `cookies` merged over them.
	///
	/// Names on the exclusion list are dropped from `cookies` first. The merged
	/// jar only affects this request.
	pub fn cookie(&self, url: &str, cookies: CookieJar, params: Params, options: RequestOptions) -> Option<Arc<Request>> {
		let cookies: CookieJar = cookies
			.into_iter()
			.filter(|(name, _)| !self.inner.config.is_cookie_excluded(name))
			.collect();

		self.issue(url, options, || {
			let headers = {
				let session = self.inner.session.lock();
				let jar = session.merged_cookies(&cookies);
				let mut overrides = Headers::new();
				overrides.insert(COOKIE_HEADER.to_string(), cookie_header_string(&jar));
				session.merged_headers(&overrides)
			};
			Request::get(url, params.clone(), headers)
		})
	}

	/// Queues a GET with `headers` applied over the session headers for this
	/// request only.
	pub fn header(&self, url: &str, headers: Headers, params: Params, options: RequestOptions) -> Option<Arc<Request>> {
		self.issue(url, options, || {
			let merged = self.inner.session.lock().merged_headers(&headers);
			Request::get(url, params.clone(), merged)
		})
	}

	fn issue<F>(&self, url: &str, options: RequestOptions, mut build: F) -> Option<Arc<Request>>
	where
		F: FnMut() -> Result<Request>,
	{
		self.inner.jail.guard(
			url,
			|| self.snapshot(),
			|| {
				let request = build()?.with_trainable(options.trainable);
				Ok(self.inner.dispatcher.queue(request))
			},
		)
	}

	/// Attaches a completion handler to a queued request.
	///
	/// Errors returned by the handler are logged and the run continues.
	pub fn on_complete<F>(&self, request: &Request, handler: F)
	where
		F: FnOnce(&Response) -> Result<()> + Send + 'static,
	{
		match request.id {
			Some(id) => self.inner.dispatcher.on_complete(id, handler),
			None => warn!(target = "probe.dispatch", url = %request.url, "handler attached to a request that was never queued"),
		}
	}

	/// Replaces the session cookies.
	pub fn set_cookies(&self, cookies: CookieJar) {
		debug!(target = "probe.session", count = cookies.len(), "session cookies replaced");
		self.inner.session.lock().set_cookies(cookies);
	}

	/// Sets a header sent with every later request.
	pub fn set_header(&self, name: &str, value: &str) {
		debug!(target = "probe.session", name, "session header set");
		self.inner.session.lock().set_header(name, value);
	}

	pub fn cookie_jar(&self) -> CookieJar {
		self.inner.session.lock().cookie_jar().clone()
	}

	/// Current session headers, always including `cookie`.
	pub fn init_headers(&self) -> Headers {
		self.inner.session.lock().headers().clone()
	}

	/// URL of the most recently queued request.
	pub fn last_url(&self) -> Option<String> {
		self.inner.dispatcher.last_url()
	}

	pub fn request_count(&self) -> u64 {
		self.inner.dispatcher.request_count()
	}

	/// Performs every queued exchange, including requests queued while running.
	pub async fn run(&self) {
		let inner = &self.inner;
		inner.dispatcher.run(&inner.transport, &inner.jail, |response| self.train(response)).await;
	}

	fn train(&self, response: &Response) {
		let resolved = training::resolve(response, &self.inner.session.lock());
		match resolved {
			Ok(Completion::Ignored) => {}
			Ok(Completion::Direct { redirected }) => {
				debug!(target = "probe.training", url = %response.effective_url, redirected, "forwarding response to trainer");
				self.inner.trainer.add_response(response, redirected);
			}
			Ok(Completion::Redirected(follow_up)) => {
				info!(
					target = "probe.training",
					from = %response.effective_url,
					to = %follow_up.url,
					"following redirect"
				);
				self.inner.dispatcher.queue(follow_up);
			}
			Err(err) => self.inner.jail.abandon(&err, &response.effective_url, || self.snapshot()),
		}
	}

	/// Whether `html` is a custom not-found page, judged under the directory
	/// of the last URL contacted.
	pub async fn is_custom_not_found(&self, html: &str) -> bool {
		match self.last_url() {
			Some(url) => self.is_custom_not_found_for(&url, html).await,
			None => {
				debug!(target = "probe.not_found", "no request issued yet, nothing to compare against");
				false
			}
		}
	}

	/// Whether `html`, served for `url`, is a custom not-found page.
	///
	/// Probes go straight to the transport with the session headers; they are
	/// not queued and get no id. If probing fails the answer is `false`.
	pub async fn is_custom_not_found_for(&self, url: &str, html: &str) -> bool {
		let inner = &self.inner;
		let fetch = |probe: String| async move {
			let request = Request::get(&probe, Params::new(), inner.session.lock().headers().clone())?;
			debug!(target = "probe.not_found", url = %probe, "probing");
			let response = inner.transport.execute(&request).await?;
			Ok::<_, Error>(response.body)
		};
		let fetch = &fetch;

		inner
			.jail
			.guard_async(url, || self.snapshot(), move || inner.detector.is_custom_not_found(url, html, fetch))
			.await
			.unwrap_or(false)
	}

	pub fn failure_stats(&self) -> FailureStats {
		self.inner.jail.stats()
	}

	/// Operations abandoned so far, oldest first.
	pub fn failures(&self) -> Vec<FailureRecord> {
		self.inner.jail.failures()
	}

	pub fn snapshot(&self) -> DispatchSnapshot {
		self.inner.dispatcher.snapshot()
	}

	/// Drops pending requests and closes the transport. Returns how many
	/// requests were dropped.
	pub fn shutdown(&self) -> usize {
		let dropped = self.inner.dispatcher.drain();
		self.inner.transport.close();
		info!(target = "probe.dispatch", dropped, "client shut down");
		dropped
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::request::pairs;
	use crate::testing::FakeTransport;

	fn client() -> (HttpClient, Arc<FakeTransport>) {
		let transport = Arc::new(FakeTransport::always("ok"));
		let client = HttpClient::builder(ClientConfig::default())
			.transport(transport.clone())
			.build()
			.unwrap();
		(client, transport)
	}

	#[test]
	fn invalid_url_is_swallowed() {
		let (client, _) = client();
		assert!(client.get("::nope::", Params::new(), RequestOptions::new()).is_none());
		assert_eq!(client.request_count(), 0);
		assert_eq!(client.failure_stats().abandoned, 1);
	}

	#[test]
	fn post_carries_no_marker() {
		let (client, _) = client();
		let request = client
			.post("http://target.test/login", pairs([("user", "admin")]), RequestOptions::new())
			.unwrap();
		assert_eq!(request.params, pairs([("user", "admin")]));
	}

	#[test]
	fn header_override_does_not_touch_session() {
		let (client, _) = client();
		client.set_header("X-Token", "session");
		let request = client
			.header(
				"http://target.test/",
				pairs([("X-Token", "override")]),
				Params::new(),
				RequestOptions::new(),
			)
			.unwrap();
		assert_eq!(request.headers["X-Token"], "override");
		assert_eq!(client.init_headers()["X-Token"], "session");
	}

	#[test]
	fn cookie_header_override_is_sent_once() {
		let (client, _) = client();
		client.set_cookies(pairs([("sid", "session")]));
		let request = client
			.header(
				"http://target.test/",
				pairs([("Cookie", "sid=other;")]),
				Params::new(),
				RequestOptions::new(),
			)
			.unwrap();
		let cookies: Vec<_> = request.headers.keys().filter(|name| name.eq_ignore_ascii_case("cookie")).collect();
		assert_eq!(cookies.len(), 1);
		assert_eq!(request.headers[COOKIE_HEADER], "sid=other;");
		assert_eq!(client.init_headers()[COOKIE_HEADER], "sid=session;");
	}

	#[test]
	fn trainable_flag_is_applied() {
		let (client, _) = client();
		let request = client
			.get("http://target.test/", Params::new(), RequestOptions::new().trainable(true))
			.unwrap();
		assert!(request.trainable);
	}

	#[tokio::test]
	async fn shutdown_drops_pending_and_closes_transport() {
		let (client, transport) = client();
		client.get("http://target.test/a", Params::new(), RequestOptions::new());
		client.get("http://target.test/b", Params::new(), RequestOptions::new());
		assert_eq!(client.shutdown(), 2);
		assert!(transport.is_closed());
		client.run().await;
		assert_eq!(transport.call_count(), 0);
	}

	#[tokio::test]
	async fn not_found_without_history_is_false() {
		let (client, transport) = client();
		assert!(!client.is_custom_not_found("anything").await);
		assert_eq!(transport.call_count(), 0);
	}
}
