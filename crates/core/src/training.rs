//! Forwarding trainable responses to the trainer.
//!
//! For every completed request the dispatcher asks [`resolve`] what to do:
//!
//! - untrainable request: nothing ([`Completion::Ignored`])
//! - trainable, no `Location`: hand the response over as is
//! - trainable, with `Location`: issue one follow-up GET to the target and
//!   hand over *its* response instead, flagged as redirect-derived
//!
//! The follow-up always resolves to [`Completion::Direct`], so only the
//! immediate next hop of a redirect chain is ever fetched.

use url::Url;

use crate::error::Result;
use crate::request::{Params, Request, Response};
use crate::session::SessionState;

/// Ingestion interface of whatever learns from the target's responses.
pub trait Trainer: Send + Sync {
	/// Called once per trainable exchange. `redirected` is set when `response`
	/// belongs to the follow-up GET of a redirect.
	fn add_response(&self, response: &Response, redirected: bool);
}

/// Trainer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrainer;

impl Trainer for NoopTrainer {
	fn add_response(&self, _response: &Response, _redirected: bool) {}
}

/// What the dispatcher should do with a completed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
	/// The request was not trainable.
	Ignored,
	/// Forward this response to the trainer.
	Direct { redirected: bool },
	/// Queue this follow-up request; the original response is not forwarded.
	Redirected(Request),
}

/// Works out the training step for `response`.
///
/// The follow-up request carries the current session headers, no marker
/// parameter and a back-reference to the request that was redirected.
pub fn resolve(response: &Response, session: &SessionState) -> Result<Completion> {
	let request = &response.request;
	if !request.trainable {
		return Ok(Completion::Ignored);
	}
	if request.is_redirect_hop() {
		return Ok(Completion::Direct { redirected: true });
	}

	let Some(location) = response.location() else {
		return Ok(Completion::Direct { redirected: false });
	};

	let target = Url::parse(&response.effective_url)?.join(location.trim())?;
	let follow_up = Request::get(target.as_str(), Params::new(), session.headers().clone())?
		.with_trainable(true)
		.with_redirect_of(request.id);
	Ok(Completion::Redirected(follow_up))
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use super::*;
	use crate::request::{Headers, MARKER_PARAM, RequestId, TransportResponse, pairs};

	fn response(request: Request, raw: TransportResponse) -> Response {
		let request = Request {
			id: Some(RequestId(4)),
			..request
		};
		Response::from_transport(raw, Arc::new(request))
	}

	fn trainable_get(url: &str) -> Request {
		Request::get(url, pairs([(MARKER_PARAM, "")]), Headers::new()).unwrap().with_trainable(true)
	}

	#[test]
	fn untrainable_responses_are_ignored() {
		let request = Request::get("http://target.test/", Params::new(), Headers::new()).unwrap();
		let raw = TransportResponse::ok("http://target.test/", "").with_header("Location", "/elsewhere");
		let completion = resolve(&response(request, raw), &SessionState::new()).unwrap();
		assert_eq!(completion, Completion::Ignored);
	}

	#[test]
	fn plain_response_is_forwarded_directly() {
		let raw = TransportResponse::ok("http://target.test/a", "body");
		let completion = resolve(&response(trainable_get("http://target.test/a"), raw), &SessionState::new()).unwrap();
		assert_eq!(completion, Completion::Direct { redirected: false });
	}

	#[test]
	fn location_yields_one_follow_up_get() {
		let mut session = SessionState::new();
		session.set_header("X-Scan", "1");
		let raw = TransportResponse::ok("http://target.test/dir/page", "")
			.with_status(302)
			.with_header("Location", "/new");

		let Completion::Redirected(follow_up) = resolve(&response(trainable_get("http://target.test/dir/page"), raw), &session).unwrap()
		else {
			panic!("expected a follow-up request");
		};
		assert_eq!(follow_up.url, "http://target.test/new");
		assert!(follow_up.trainable);
		assert!(follow_up.params.is_empty());
		assert_eq!(follow_up.redirect_of, Some(RequestId(4)));
		assert_eq!(follow_up.headers.get("X-Scan").map(String::as_str), Some("1"));
		assert_eq!(follow_up.id, None);
	}

	#[test]
	fn relative_location_resolves_against_effective_url() {
		let raw = TransportResponse::ok("http://target.test/dir/page", "").with_header("location", "next?x=1");
		let Completion::Redirected(follow_up) =
			resolve(&response(trainable_get("http://target.test/dir/page"), raw), &SessionState::new()).unwrap()
		else {
			panic!("expected a follow-up request");
		};
		assert_eq!(follow_up.url, "http://target.test/dir/next?x=1");
	}

	#[test]
	fn follow_up_response_is_never_followed_again() {
		let hop = Request::get("http://target.test/new", Params::new(), Headers::new())
			.unwrap()
			.with_trainable(true)
			.with_redirect_of(Some(RequestId(0)));
		let raw = TransportResponse::ok("http://target.test/new", "").with_header("Location", "/third");
		let completion = resolve(&response(hop, raw), &SessionState::new()).unwrap();
		assert_eq!(completion, Completion::Direct { redirected: true });
	}

	#[test]
	fn unusable_location_is_an_error() {
		let raw = TransportResponse::ok("http://target.test/", "").with_header("Location", "http://[::1");
		let err = resolve(&response(trainable_get("http://target.test/"), raw), &SessionState::new()).unwrap_err();
		assert!(matches!(err, crate::Error::InvalidRequest(_)));
	}
}
