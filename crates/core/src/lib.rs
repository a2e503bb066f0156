//! Asynchronous HTTP dispatch for scanning probes.
//!
//! An [`HttpClient`] queues requests from probe code, performs them with a
//! bounded number of concurrent exchanges once [`HttpClient::run`] is awaited,
//! forwards trainable responses (following one redirect hop) to a [`Trainer`]
//! and answers whether a response body is the target's custom not-found page.
//! Transport failures never escape to probe code: transient ones are retried
//! after a connection refresh, everything else is logged and skipped.

pub mod client;
pub mod config;
pub mod cookie;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod jail;
pub mod not_found;
pub mod request;
pub mod session;
pub mod testing;
pub mod training;
pub mod transport;

pub use client::{HttpClient, HttpClientBuilder};
pub use config::{BaselineKeying, ClientConfig, RetryConfig};
pub use cookie::{cookie_header_string, parse_cookie_header_string, parse_cookie_jar, parse_cookie_jar_file};
pub use dispatcher::{DispatchSnapshot, Dispatcher};
pub use error::{Error, FailureKind, Result};
pub use jail::{FailureRecord, FailureStats, Jail, RetryPolicy, Verdict};
pub use not_found::NotFoundDetector;
pub use request::{CookieJar, Headers, MARKER_PARAM, Method, Params, Request, RequestId, RequestOptions, Response, TransportResponse};
pub use session::SessionState;
pub use training::{Completion, NoopTrainer, Trainer};
pub use transport::{ReqwestTransport, Transport};
