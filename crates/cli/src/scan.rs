//! Turns command-line options into a client, runs the probes and writes the report.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use probe_http::cookie::into_jar;
use probe_http::{ClientConfig, HttpClient, Params, RequestOptions, Response, parse_cookie_header_string, parse_cookie_jar_file};
use tracing::{info, warn};

use crate::cli::Cli;
use crate::report::{LoggingTrainer, ResponseLine, Summary};

/// Client settings from `--config` with flags applied on top.
pub fn build_config(cli: &Cli) -> Result<ClientConfig> {
	let mut config = match &cli.config {
		Some(path) => ClientConfig::from_file(path).with_context(|| format!("failed to load config {}", path.display()))?,
		None => ClientConfig::default(),
	};

	if let Some(concurrency) = cli.concurrency {
		config.max_concurrency = concurrency;
	}
	if let Some(user_agent) = &cli.user_agent {
		config.user_agent = user_agent.clone();
	}
	if cli.proxy.is_some() {
		config.proxy = cli.proxy.clone();
	}
	if cli.user.is_some() {
		config.username = cli.user.clone();
		config.password = cli.password.clone();
	}
	config.exclude_cookies.extend(cli.exclude_cookies.iter().cloned());
	Ok(config)
}

/// Runs every URL once and writes one JSON line per response, then the summary.
pub async fn execute(cli: &Cli, out: &mut impl Write) -> Result<Summary> {
	let trainer = Arc::new(LoggingTrainer::default());
	let client = HttpClient::builder(build_config(cli)?)
		.trainer(trainer.clone())
		.build()
		.context("failed to create HTTP client")?;

	seed_cookies(&client, cli)?;

	let completed: Arc<Mutex<Vec<Response>>> = Arc::default();
	let options = RequestOptions::new().trainable(cli.train);
	for url in &cli.urls {
		let request = if cli.post {
			client.post(url, Params::new(), options)
		} else {
			client.get(url, Params::new(), options)
		};
		let Some(request) = request else {
			warn!(target = "probe.dispatch", url = %url, "request was not queued");
			continue;
		};
		let sink = Arc::clone(&completed);
		client.on_complete(&request, move |response| {
			sink.lock().push(response.clone());
			Ok(())
		});
	}

	client.run().await;

	let responses = std::mem::take(&mut *completed.lock());
	for response in &responses {
		let mut line = ResponseLine::new(response);
		if cli.check_not_found {
			line.not_found = Some(client.is_custom_not_found_for(&response.request.url, &response.body).await);
		}
		serde_json::to_writer(&mut *out, &line)?;
		writeln!(out)?;
	}

	let summary = Summary {
		requests: client.request_count(),
		responses: responses.len(),
		trained: trainer.ingested(),
		trained_redirects: trainer.redirected(),
		failures: client.failure_stats(),
	};
	serde_json::to_writer(&mut *out, &summary)?;
	writeln!(out)?;

	client.shutdown();
	info!(target = "probe.dispatch", responses = summary.responses, "scan finished");
	Ok(summary)
}

fn seed_cookies(client: &HttpClient, cli: &Cli) -> Result<()> {
	let mut jar = match &cli.cookie_jar {
		Some(path) => parse_cookie_jar_file(path).with_context(|| format!("failed to read cookie jar {}", path.display()))?,
		None => Default::default(),
	};
	if let Some(cookies) = &cli.cookies {
		jar.extend(into_jar(parse_cookie_header_string(cookies)));
	}
	if !jar.is_empty() {
		client.set_cookies(jar);
	}
	Ok(())
}
