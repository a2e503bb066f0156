//! Soft-404 detection.
//!
//! Many applications answer unknown paths with `200 OK` and a templated
//! error page. To recognise such pages the detector requests two paths that
//! cannot exist, keeps the first body as the reference and the words and
//! separators both bodies share as the baseline signature. A body is a custom not-found
//! page when its signature against the reference equals that baseline.
//!
//! Baselines are computed lazily and at most once per key: with
//! [`BaselineKeying::Instance`] the whole client shares one baseline probed
//! under the directory of the first URL judged, with
//! [`BaselineKeying::Directory`] every directory gets its own.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::BaselineKeying;
use crate::diff;
use crate::error::Result;

/// Hex-encoded 20 random bytes.
pub fn random_hex() -> String {
	hex::encode(rand::random::<[u8; 20]>())
}

/// `url` cut back to its last `/`, without query or fragment.
pub fn directory_of(url: &str) -> Result<String> {
	let mut parsed = Url::parse(url)?;
	parsed.set_query(None);
	parsed.set_fragment(None);
	let directory = match parsed.path().rfind('/') {
		Some(slash) => parsed.path()[..=slash].to_string(),
		None => "/".to_string(),
	};
	parsed.set_path(&directory);
	Ok(parsed.into())
}

/// A path under `directory` that should not exist.
pub fn probe_url(directory: &str) -> String {
	format!("{directory}{}/", random_hex())
}

/// Reference not-found body plus the signature two such bodies share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Baseline {
	reference: String,
	signature: Vec<String>,
}

impl Baseline {
	pub fn new(reference: String, second: &str) -> Self {
		let signature = diff::common_tokens(&diff::tokens(&reference), &diff::tokens(second))
			.into_iter()
			.map(str::to_string)
			.collect();
		Self { reference, signature }
	}

	pub fn signature(&self) -> String {
		self.signature.concat()
	}

	/// Whether `html` relates to the reference the same way two not-found pages do.
	pub fn matches(&self, html: &str) -> bool {
		let html = diff::tokens(html);
		// The signature can only come back if `html` contains it.
		if !diff::is_subsequence(&self.signature, &html) {
			return false;
		}
		diff::common_tokens(&diff::tokens(&self.reference), &html) == self.signature
	}
}

/// Lazily probed soft-404 baselines.
pub struct NotFoundDetector {
	keying: BaselineKeying,
	baselines: Mutex<HashMap<String, Arc<OnceCell<Baseline>>>>,
}

impl NotFoundDetector {
	pub fn new(keying: BaselineKeying) -> Self {
		Self {
			keying,
			baselines: Mutex::new(HashMap::new()),
		}
	}

	/// Number of baselines computed so far.
	pub fn baseline_count(&self) -> usize {
		self.baselines.lock().values().filter(|cell| cell.initialized()).count()
	}

	fn slot(&self, directory: &str) -> Arc<OnceCell<Baseline>> {
		let key = match self.keying {
			BaselineKeying::Instance => String::new(),
			BaselineKeying::Directory => directory.to_string(),
		};
		Arc::clone(self.baselines.lock().entry(key).or_default())
	}

	/// Judges `html`, which was served for `url`.
	///
	/// `fetch` performs a GET for a probe URL and returns the body. It is only
	/// called when the baseline for `url` has not been computed yet; if it
	/// fails the baseline stays unset and the next call probes again.
	pub async fn is_custom_not_found<F, Fut>(&self, url: &str, html: &str, fetch: F) -> Result<bool>
	where
		F: Fn(String) -> Fut,
		Fut: Future<Output = Result<String>>,
	{
		let directory = directory_of(url)?;
		let slot = self.slot(&directory);
		let baseline = slot
			.get_or_try_init(|| async {
				let first = fetch(probe_url(&directory)).await?;
				let second = fetch(probe_url(&directory)).await?;
				info!(target = "probe.not_found", directory = %directory, "computed not-found baseline");
				Ok::<_, crate::Error>(Baseline::new(first, &second))
			})
			.await?;

		let matched = baseline.matches(html);
		debug!(target = "probe.not_found", url, matched, "compared body against baseline");
		Ok(matched)
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::{Duration, Instant};

	use super::*;

	#[test]
	fn directory_drops_last_segment_and_query() {
		assert_eq!(directory_of("http://target.test/a/b/page.php?id=1#top").unwrap(), "http://target.test/a/b/");
		assert_eq!(directory_of("http://target.test/a/b/").unwrap(), "http://target.test/a/b/");
		assert_eq!(directory_of("http://target.test").unwrap(), "http://target.test/");
	}

	#[test]
	fn probes_are_random_and_end_with_slash() {
		let first = probe_url("http://target.test/a/");
		let second = probe_url("http://target.test/a/");
		assert_ne!(first, second);
		assert!(first.starts_with("http://target.test/a/"));
		assert!(first.ends_with('/'));
		assert_eq!(first.len(), "http://target.test/a/".len() + 41);
	}

	#[test]
	fn baseline_matches_templated_not_found_pages() {
		let baseline = Baseline::new("Not Found 123".into(), "Not Found 456");
		assert_eq!(baseline.signature(), "Not Found ");
		assert!(baseline.matches("Not Found 789"));
		assert!(!baseline.matches("Login"));
		assert!(baseline.matches("Not Found 183"));
	}

	fn page(token: &str) -> String {
		format!(
			"<html><head><title>Error</title></head><body><h1>Oops</h1>\
			 <p>The page /{token}/ could not be found.</p><footer>target.test</footer></body></html>"
		)
	}

	#[test]
	fn reflected_random_paths_cancel_out() {
		for _ in 0..200 {
			let baseline = Baseline::new(page(&random_hex()), &page(&random_hex()));
			assert!(baseline.matches(&page(&random_hex())));
			assert!(!baseline.matches("<html><body><h1>Welcome back</h1></body></html>"));
		}
	}

	#[test]
	fn large_unrelated_body_is_judged_quickly() {
		let baseline = Baseline::new(page(&random_hex()), &page(&random_hex()));
		let mut body = String::from("<html><body><ul>");
		for i in 0..3000 {
			body.push_str(&format!("<li class=\"row\">item {i} of the catalogue</li>\n"));
		}
		body.push_str("</ul></body></html>");
		assert!(body.len() > 60_000);

		let started = Instant::now();
		let first = baseline.matches(&body);
		let second = baseline.matches(&body);
		assert!(started.elapsed() < Duration::from_secs(1));
		assert!(!first);
		assert_eq!(first, second);
	}

	#[tokio::test]
	async fn instance_keying_probes_once() {
		let detector = NotFoundDetector::new(BaselineKeying::Instance);
		let fetches = AtomicUsize::new(0);
		let fetch = |_url: String| {
			let n = fetches.fetch_add(1, Ordering::SeqCst);
			async move { Ok::<_, crate::Error>(format!("Not Found {n}{n}{n}")) }
		};

		assert!(detector.is_custom_not_found("http://target.test/a/x", "Not Found 999", &fetch).await.unwrap());
		assert!(!detector.is_custom_not_found("http://target.test/b/y", "Welcome", &fetch).await.unwrap());
		assert_eq!(fetches.load(Ordering::SeqCst), 2);
		assert_eq!(detector.baseline_count(), 1);
	}

	#[tokio::test]
	async fn directory_keying_probes_each_directory() {
		let detector = NotFoundDetector::new(BaselineKeying::Directory);
		let probed = parking_lot::Mutex::new(Vec::new());
		let fetch = |url: String| {
			probed.lock().push(url);
			async { Ok::<_, crate::Error>("gone".to_string()) }
		};

		detector.is_custom_not_found("http://target.test/a/x", "gone", &fetch).await.unwrap();
		detector.is_custom_not_found("http://target.test/a/z", "gone", &fetch).await.unwrap();
		detector.is_custom_not_found("http://target.test/b/y", "gone", &fetch).await.unwrap();

		let probed = probed.lock();
		assert_eq!(probed.len(), 4);
		assert!(probed[..2].iter().all(|url| url.starts_with("http://target.test/a/")));
		assert!(probed[2..].iter().all(|url| url.starts_with("http://target.test/b/")));
	}

	#[tokio::test]
	async fn failed_probe_leaves_baseline_unset() {
		let detector = NotFoundDetector::new(BaselineKeying::Instance);
		let fetch = |_url: String| async { Err::<String, _>(crate::Error::Timeout("slow".into())) };
		assert!(detector.is_custom_not_found("http://target.test/", "x", fetch).await.is_err());
		assert_eq!(detector.baseline_count(), 0);
	}
}
