//! Persistent session headers shared by every request of one client.

use crate::cookie::{cookie_header_string, into_jar, parse_cookie_header_string};
use crate::request::{CookieJar, Headers};

/// Header key under which the composed cookie string is stored.
pub const COOKIE_HEADER: &str = "cookie";

/// Session headers plus the cookie jar they were composed from.
///
/// `headers[COOKIE_HEADER]` always exists (possibly empty) and always equals
/// the rendering of `cookie_jar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
	headers: Headers,
	cookie_jar: CookieJar,
}

impl Default for SessionState {
	fn default() -> Self {
		Self::new()
	}
}

impl SessionState {
	pub fn new() -> Self {
		let mut headers = Headers::new();
		headers.insert(COOKIE_HEADER.to_string(), String::new());
		Self {
			headers,
			cookie_jar: CookieJar::new(),
		}
	}

	pub fn headers(&self) -> &Headers {
		&self.headers
	}

	pub fn cookie_jar(&self) -> &CookieJar {
		&self.cookie_jar
	}

	/// The composed `name=value;` cookie string.
	pub fn cookie_header(&self) -> &str {
		self.headers.get(COOKIE_HEADER).map(String::as_str).unwrap_or_default()
	}

	/// Replaces the session cookies entirely.
	pub fn set_cookies(&mut self, cookies: CookieJar) {
		self.headers.insert(COOKIE_HEADER.to_string(), cookie_header_string(&cookies));
		self.cookie_jar = cookies;
	}

	/// Sets a persistent header. Writing the cookie header re-derives the jar.
	pub fn set_header(&mut self, name: &str, value: &str) {
		if name.eq_ignore_ascii_case(COOKIE_HEADER) {
			self.set_cookies(into_jar(parse_cookie_header_string(value)));
			return;
		}
		put_header(&mut self.headers, name, value);
	}

	/// Session headers with `overrides` applied on top; the session itself is
	/// left untouched. Names match case-insensitively, so an override replaces
	/// the session header however either is spelled.
	pub fn merged_headers(&self, overrides: &Headers) -> Headers {
		let mut merged = self.headers.clone();
		for (name, value) in overrides {
			put_header(&mut merged, name, value);
		}
		merged
	}

	/// Session cookies with `extra` merged over them (new values win), for a
	/// single request.
	pub fn merged_cookies(&self, extra: &CookieJar) -> CookieJar {
		let mut jar = into_jar(parse_cookie_header_string(self.cookie_header()));
		for (name, value) in extra {
			jar.insert(name.clone(), value.clone());
		}
		jar
	}
}

/// Replaces the value of the header named `name` in any case, keeping its
/// position and spelling, or appends it.
fn put_header(headers: &mut Headers, name: &str, value: &str) {
	match headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(name)) {
		Some((_, slot)) => *slot = value.to_string(),
		None => {
			headers.insert(name.to_string(), value.to_string());
		}
	}
}
