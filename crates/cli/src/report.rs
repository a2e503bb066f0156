//! Output records and the trainer that feeds the summary.

use std::sync::atomic::{AtomicU64, Ordering};

use probe_http::{FailureStats, Response, Trainer};
use serde::Serialize;
use tracing::info;

/// One line of output per completed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseLine {
	pub id: Option<u64>,
	pub url: String,
	pub status: u16,
	pub bytes: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub not_found: Option<bool>,
}

impl ResponseLine {
	pub fn new(response: &Response) -> Self {
		Self {
			id: response.request_id().map(|id| id.0),
			url: response.effective_url.clone(),
			status: response.status,
			bytes: response.body.len(),
			not_found: None,
		}
	}
}

/// Final line printed after every response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
	pub requests: u64,
	pub responses: usize,
	pub trained: u64,
	pub trained_redirects: u64,
	pub failures: FailureStats,
}

/// Trainer that logs and counts what it is given.
#[derive(Debug, Default)]
pub struct LoggingTrainer {
	ingested: AtomicU64,
	redirected: AtomicU64,
}

impl LoggingTrainer {
	pub fn ingested(&self) -> u64 {
		self.ingested.load(Ordering::Relaxed)
	}

	pub fn redirected(&self) -> u64 {
		self.redirected.load(Ordering::Relaxed)
	}
}

impl Trainer for LoggingTrainer {
	fn add_response(&self, response: &Response, redirected: bool) {
		self.ingested.fetch_add(1, Ordering::Relaxed);
		if redirected {
			self.redirected.fetch_add(1, Ordering::Relaxed);
		}
		info!(
			target = "probe.training",
			url = %response.effective_url,
			status = response.status,
			redirected,
			"trainer ingested response"
		);
	}
}
