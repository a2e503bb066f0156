//! Failure containment for dispatch work.
//!
//! Every issuing operation, completion callback and probe runs inside the
//! [`Jail`]. A transient failure (timeout, broken connection) refreshes the
//! transport and retries the same operation within the [`RetryPolicy`] budget.
//! Any other failure is logged with diagnostics and the operation is dropped;
//! the error never reaches the caller, but it is counted in [`FailureStats`]
//! and kept in a short history of [`FailureRecord`]s.

use std::backtrace::Backtrace;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::dispatcher::DispatchSnapshot;
use crate::error::{Error, FailureKind, Result};
use crate::transport::Transport;

const FAILURE_HISTORY: usize = 256;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
	max_retries: u32,
	initial_backoff: Duration,
	max_backoff: Duration,
}

impl RetryPolicy {
	pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
		Self {
			max_retries,
			initial_backoff,
			max_backoff,
		}
	}

	/// Delay before retry number `attempt + 1` (`attempt` counts retries already made).
	pub fn backoff(&self, attempt: u32) -> Duration {
		let factor = 1u32 << attempt.min(16);
		self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
	}

	/// Decides what to do about `err` after `attempt` retries.
	pub fn decide(&self, err: &Error, attempt: u32) -> Verdict {
		match err.kind() {
			FailureKind::Transient if attempt < self.max_retries => Verdict::Retry {
				attempt: attempt + 1,
				delay: self.backoff(attempt),
			},
			_ => Verdict::Abandon,
		}
	}
}

impl From<&RetryConfig> for RetryPolicy {
	fn from(config: &RetryConfig) -> Self {
		Self::new(config.max_retries, config.initial_backoff(), config.max_backoff())
	}
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from(&RetryConfig::default())
	}
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
	/// Run the operation again as retry number `attempt` after `delay`.
	Retry { attempt: u32, delay: Duration },
	/// Give up on the operation.
	Abandon,
}

/// Counters describing how the jail has handled failures so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureStats {
	/// Transient failures observed (retried or not).
	pub transient: u64,
	/// Transport refreshes performed before a retry.
	pub refreshes: u64,
	/// Operations dropped without success.
	pub abandoned: u64,
	/// Abandoned operations whose failures were transient but out of budget.
	pub exhausted: u64,
}

/// A failure that ended an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
	pub kind: FailureKind,
	pub url: String,
	pub message: String,
}

#[derive(Default)]
struct Counters {
	transient: AtomicU64,
	refreshes: AtomicU64,
	abandoned: AtomicU64,
	exhausted: AtomicU64,
}

/// Classifies failures, refreshes the transport and records what was dropped.
pub struct Jail {
	policy: RetryPolicy,
	transport: Arc<dyn Transport>,
	counters: Counters,
	history: Mutex<VecDeque<FailureRecord>>,
}

impl Jail {
	pub fn new(policy: RetryPolicy, transport: Arc<dyn Transport>) -> Self {
		Self {
			policy,
			transport,
			counters: Counters::default(),
			history: Mutex::new(VecDeque::with_capacity(FAILURE_HISTORY)),
		}
	}

	pub fn stats(&self) -> FailureStats {
		FailureStats {
			transient: self.counters.transient.load(Ordering::Relaxed),
			refreshes: self.counters.refreshes.load(Ordering::Relaxed),
			abandoned: self.counters.abandoned.load(Ordering::Relaxed),
			exhausted: self.counters.exhausted.load(Ordering::Relaxed),
		}
	}

	/// Most recent abandoned operations, oldest first.
	pub fn failures(&self) -> Vec<FailureRecord> {
		self.history.lock().iter().cloned().collect()
	}

	/// Handles one failure of the operation at `url`.
	///
	/// On [`Verdict::Retry`] the transport has already been refreshed; the
	/// caller waits for the delay and runs the operation again. On
	/// [`Verdict::Abandon`] the failure has been logged and recorded.
	pub fn on_error<S>(&self, err: &Error, url: &str, attempt: u32, snapshot: S) -> Verdict
	where
		S: FnOnce() -> DispatchSnapshot,
	{
		if err.is_transient() {
			self.counters.transient.fetch_add(1, Ordering::Relaxed);
		}

		match self.policy.decide(err, attempt) {
			Verdict::Retry { attempt, delay } => {
				error!(target = "probe.jail", url, error = %err, "transient failure");
				info!(target = "probe.jail", attempt, delay_ms = delay.as_millis() as u64, "refreshing connection");
				self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
				if let Err(refresh_err) = self.transport.refresh() {
					warn!(target = "probe.jail", error = %refresh_err, "connection refresh failed");
				}
				Verdict::Retry { attempt, delay }
			}
			Verdict::Abandon => {
				if err.is_transient() {
					self.counters.exhausted.fetch_add(1, Ordering::Relaxed);
					warn!(target = "probe.jail", url, retries = attempt, "retry budget exhausted");
				}
				self.abandon(err, url, snapshot);
				Verdict::Abandon
			}
		}
	}

	/// Logs `err` with diagnostics and records the dropped operation.
	pub fn abandon<S>(&self, err: &Error, url: &str, snapshot: S)
	where
		S: FnOnce() -> DispatchSnapshot,
	{
		self.counters.abandoned.fetch_add(1, Ordering::Relaxed);

		error!(target = "probe.jail", url, error = %err, "operation failed");
		debug!(target = "probe.jail", error = ?err, "failure detail");
		debug!(target = "probe.jail", backtrace = %Backtrace::capture(), "failure context");
		debug!(target = "probe.jail", dispatcher = ?snapshot(), "dispatcher state");
		error!(target = "probe.jail", "proceeding anyway");

		let mut history = self.history.lock();
		if history.len() == FAILURE_HISTORY {
			history.pop_front();
		}
		history.push_back(FailureRecord {
			kind: err.kind(),
			url: url.to_string(),
			message: err.to_string(),
		});
	}

	/// Runs a synchronous block, retrying it immediately on transient failures.
	pub fn guard<T, F, S>(&self, url: &str, snapshot: S, mut op: F) -> Option<T>
	where
		F: FnMut() -> Result<T>,
		S: Fn() -> DispatchSnapshot,
	{
		let mut attempt = 0;
		loop {
			match op() {
				Ok(value) => return Some(value),
				Err(err) => match self.on_error(&err, url, attempt, &snapshot) {
					Verdict::Retry { attempt: next, .. } => attempt = next,
					Verdict::Abandon => return None,
				},
			}
		}
	}

	/// Runs an async block, waiting out the backoff between retries.
	pub async fn guard_async<T, F, Fut, S>(&self, url: &str, snapshot: S, mut op: F) -> Option<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
		S: Fn() -> DispatchSnapshot,
	{
		let mut attempt = 0;
		loop {
			match op().await {
				Ok(value) => return Some(value),
				Err(err) => match self.on_error(&err, url, attempt, &snapshot) {
					Verdict::Retry { attempt: next, delay } => {
						if !delay.is_zero() {
							tokio::time::sleep(delay).await;
						}
						attempt = next;
					}
					Verdict::Abandon => return None,
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicU32;

	use super::*;
	use crate::testing::FakeTransport;

	fn jail(max_retries: u32) -> (Jail, Arc<FakeTransport>) {
		let transport = Arc::new(FakeTransport::always(""));
		let policy = RetryPolicy::new(max_retries, Duration::ZERO, Duration::ZERO);
		(Jail::new(policy, transport.clone()), transport)
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(1000));
		assert_eq!(policy.backoff(0), Duration::from_millis(100));
		assert_eq!(policy.backoff(1), Duration::from_millis(200));
		assert_eq!(policy.backoff(3), Duration::from_millis(800));
		assert_eq!(policy.backoff(4), Duration::from_millis(1000));
		assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(1000));
	}

	#[test]
	fn only_transient_errors_are_retried() {
		let policy = RetryPolicy::new(2, Duration::ZERO, Duration::ZERO);
		assert!(matches!(policy.decide(&Error::Timeout("t".into()), 0), Verdict::Retry { attempt: 1, .. }));
		assert!(matches!(policy.decide(&Error::Timeout("t".into()), 2), Verdict::Abandon));
		assert!(matches!(policy.decide(&Error::Transport("dns".into()), 0), Verdict::Abandon));
	}

	#[test]
	fn guard_retries_transient_failure_after_refresh() {
		let (jail, transport) = jail(3);
		let calls = AtomicU32::new(0);
		let value = jail.guard("http://target.test/", DispatchSnapshot::default, || {
			if calls.fetch_add(1, Ordering::SeqCst) == 0 {
				Err(Error::ConnectionReset("broken pipe".into()))
			} else {
				Ok(7)
			}
		});
		assert_eq!(value, Some(7));
		assert_eq!(transport.refresh_count(), 1);
		assert_eq!(jail.stats().refreshes, 1);
		assert_eq!(jail.stats().abandoned, 0);
	}

	#[test]
	fn guard_swallows_opaque_failure() {
		let (jail, transport) = jail(3);
		let value: Option<()> = jail.guard("http://target.test/x", DispatchSnapshot::default, || Err(Error::InvalidRequest("bad".into())));
		assert_eq!(value, None);
		assert_eq!(transport.refresh_count(), 0);
		let failures = jail.failures();
		assert_eq!(failures.len(), 1);
		assert_eq!(failures[0].kind, FailureKind::Opaque);
		assert_eq!(failures[0].url, "http://target.test/x");
	}

	#[tokio::test]
	async fn guard_async_gives_up_when_budget_runs_out() {
		let (jail, transport) = jail(2);
		let value: Option<()> = jail
			.guard_async("http://target.test/", DispatchSnapshot::default, || async { Err(Error::Timeout("slow".into())) })
			.await;
		assert_eq!(value, None);
		assert_eq!(transport.refresh_count(), 2);
		let stats = jail.stats();
		assert_eq!(stats.transient, 3);
		assert_eq!(stats.exhausted, 1);
		assert_eq!(stats.abandoned, 1);
	}

	#[test]
	fn history_is_bounded() {
		let (jail, _) = jail(0);
		for i in 0..(FAILURE_HISTORY + 10) {
			jail.abandon(&Error::Transport(format!("e{i}")), "http://target.test/", DispatchSnapshot::default);
		}
		let failures = jail.failures();
		assert_eq!(failures.len(), FAILURE_HISTORY);
		assert_eq!(failures[0].message, "transport error: e10");
	}
}
