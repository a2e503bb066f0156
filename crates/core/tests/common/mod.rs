#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use probe_http::testing::FakeTransport;
use probe_http::{ClientConfig, HttpClient, Response, RetryConfig, Trainer};

/// One `add_response` call seen by a [`RecordingTrainer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
	pub url: String,
	pub status: u16,
	pub redirected: bool,
}

#[derive(Default)]
pub struct RecordingTrainer {
	seen: Mutex<Vec<Ingested>>,
}

impl RecordingTrainer {
	pub fn seen(&self) -> Vec<Ingested> {
		self.seen.lock().clone()
	}
}

impl Trainer for RecordingTrainer {
	fn add_response(&self, response: &Response, redirected: bool) {
		self.seen.lock().push(Ingested {
			url: response.effective_url.clone(),
			status: response.status,
			redirected,
		});
	}
}

/// Routes engine logs to the test harness; `RUST_LOG` narrows them.
pub fn init_test_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

/// Config with instant retries so tests never sleep on backoff.
pub fn fast_config() -> ClientConfig {
	ClientConfig {
		retry: RetryConfig {
			max_retries: 3,
			initial_backoff_ms: 0,
			max_backoff_ms: 0,
		},
		..ClientConfig::default()
	}
}

pub fn client_with(config: ClientConfig, transport: &Arc<FakeTransport>) -> HttpClient {
	HttpClient::builder(config)
		.transport(transport.clone())
		.build()
		.expect("client builds with fake transport")
}

pub fn trained_client(transport: &Arc<FakeTransport>) -> (HttpClient, Arc<RecordingTrainer>) {
	let trainer = Arc::new(RecordingTrainer::default());
	let client = HttpClient::builder(fast_config())
		.transport(transport.clone())
		.trainer(trainer.clone())
		.build()
		.expect("client builds with fake transport");
	(client, trainer)
}

pub const SHORT_LATENCY: Duration = Duration::from_millis(20);
