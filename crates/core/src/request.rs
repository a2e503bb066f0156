//! Request and response values exchanged with the dispatcher.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use url::Url;

use crate::error::Result;

/// Parameter name merged into GET requests unless suppressed. It carries no
/// value and lets the target's logs and the trainer tell probe traffic apart.
pub const MARKER_PARAM: &str = "__probe__";

/// Ordered header mapping.
pub type Headers = IndexMap<String, String>;

/// Ordered request parameters (query string for GET, form body for POST).
pub type Params = IndexMap<String, String>;

/// Ordered cookie name/value mapping.
pub type CookieJar = IndexMap<String, String>;

/// Builds an ordered string map from borrowed pairs.
pub fn pairs<K, V, I>(items: I) -> IndexMap<String, String>
where
	K: Into<String>,
	V: Into<String>,
	I: IntoIterator<Item = (K, V)>,
{
	items.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Per-client sequence number assigned when a request is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	Get,
	Post,
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Method::Get => f.write_str("GET"),
			Method::Post => f.write_str("POST"),
		}
	}
}

/// One HTTP exchange to perform.
///
/// Requests are built by the issuing operations on [`HttpClient`](crate::HttpClient),
/// receive their id when queued and are shared as `Arc<Request>` from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Request {
	/// `None` until the dispatcher queues the request.
	pub id: Option<RequestId>,
	pub url: String,
	pub method: Method,
	pub headers: Headers,
	pub params: Params,
	/// Forward the response (or its redirect target's) to the trainer.
	pub trainable: bool,
	/// Set on the follow-up GET issued for a trainable redirect.
	pub redirect_of: Option<RequestId>,
}

impl Request {
	/// Builds an unqueued request, rejecting URLs that do not parse.
	pub fn new(method: Method, url: &str, params: Params, headers: Headers) -> Result<Self> {
		Url::parse(url)?;
		Ok(Self {
			id: None,
			url: url.to_string(),
			method,
			headers,
			params,
			trainable: false,
			redirect_of: None,
		})
	}

	pub fn get(url: &str, params: Params, headers: Headers) -> Result<Self> {
		Self::new(Method::Get, url, params, headers)
	}

	pub fn post(url: &str, params: Params, headers: Headers) -> Result<Self> {
		Self::new(Method::Post, url, params, headers)
	}

	pub fn with_trainable(mut self, trainable: bool) -> Self {
		self.trainable = trainable;
		self
	}

	pub fn with_redirect_of(mut self, origin: Option<RequestId>) -> Self {
		self.redirect_of = origin;
		self
	}

	/// Returns `true` for the follow-up GET of a trainable redirect.
	pub fn is_redirect_hop(&self) -> bool {
		self.redirect_of.is_some()
	}
}

/// Flags accepted by the issuing operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
	pub trainable: bool,
	/// Leave [`MARKER_PARAM`] out of GET parameters.
	pub suppress_marker: bool,
}

impl RequestOptions {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn trainable(mut self, trainable: bool) -> Self {
		self.trainable = trainable;
		self
	}

	#[must_use]
	pub fn suppress_marker(mut self, suppress: bool) -> Self {
		self.suppress_marker = suppress;
		self
	}
}

/// Raw result of one exchange as produced by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportResponse {
	pub status: u16,
	pub headers: Vec<(String, String)>,
	pub body: String,
	/// Final URL of the exchange (redirects are never followed, so this is
	/// the requested URL including its query string).
	pub effective_url: String,
}

impl TransportResponse {
	/// A `200 OK` with the given body.
	pub fn ok(effective_url: impl Into<String>, body: impl Into<String>) -> Self {
		Self {
			status: 200,
			headers: Vec::new(),
			body: body.into(),
			effective_url: effective_url.into(),
		}
	}

	#[must_use]
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = status;
		self
	}

	#[must_use]
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}
}

/// A completed exchange together with the request that produced it.
#[derive(Debug, Clone)]
pub struct Response {
	pub status: u16,
	pub headers: Vec<(String, String)>,
	pub body: String,
	pub effective_url: String,
	pub request: Arc<Request>,
}

impl Response {
	pub fn from_transport(raw: TransportResponse, request: Arc<Request>) -> Self {
		Self {
			status: raw.status,
			headers: raw.headers,
			body: raw.body,
			effective_url: raw.effective_url,
			request,
		}
	}

	/// First header value with a case-insensitive name match.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	/// The `Location` header, if the response carries one.
	pub fn location(&self) -> Option<&str> {
		self.header("location").filter(|value| !value.trim().is_empty())
	}

	pub fn request_id(&self) -> Option<RequestId> {
		self.request.id
	}
}
