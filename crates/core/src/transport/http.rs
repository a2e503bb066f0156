//! `reqwest`-backed transport.

use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, redirect};
use tracing::{debug, info};

use super::{ExchangeFuture, Transport};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::request::{Method, Request, TransportResponse};

#[derive(Debug, Clone)]
struct Settings {
	user_agent: String,
	timeout: Duration,
	proxy: Option<String>,
	accept_invalid_certs: bool,
	max_idle_per_host: usize,
	username: Option<String>,
	password: Option<String>,
}

/// Production transport over a pooled `reqwest::Client`.
///
/// The client is rebuilt from the same settings on [`Transport::refresh`], which
/// discards every pooled connection.
pub struct ReqwestTransport {
	settings: Settings,
	client: RwLock<Option<Client>>,
}

impl ReqwestTransport {
	pub fn new(config: &ClientConfig) -> Result<Self> {
		let settings = Settings {
			user_agent: config.user_agent.clone(),
			timeout: config.request_timeout(),
			proxy: config.proxy.clone(),
			accept_invalid_certs: config.accept_invalid_certs,
			max_idle_per_host: config.concurrency(),
			username: config.username.clone(),
			password: config.password.clone(),
		};
		let client = build_client(&settings)?;
		Ok(Self {
			settings,
			client: RwLock::new(Some(client)),
		})
	}

	fn client(&self) -> Result<Client> {
		self.client.read().clone().ok_or(Error::Closed)
	}

	fn prepare(&self, client: &Client, request: &Request) -> RequestBuilder {
		let mut builder = match request.method {
			Method::Get => client.get(&request.url).query(&request.params),
			Method::Post => client.post(&request.url).form(&request.params),
		};
		for (name, value) in &request.headers {
			if name.eq_ignore_ascii_case("cookie") && value.is_empty() {
				continue;
			}
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(username) = &self.settings.username {
			builder = builder.basic_auth(username, self.settings.password.as_deref());
		}
		builder
	}
}

fn build_client(settings: &Settings) -> Result<Client> {
	let mut builder = Client::builder()
		.redirect(redirect::Policy::none())
		.user_agent(&settings.user_agent)
		.timeout(settings.timeout)
		.pool_max_idle_per_host(settings.max_idle_per_host)
		.danger_accept_invalid_certs(settings.accept_invalid_certs);

	if let Some(proxy) = &settings.proxy {
		let proxy = reqwest::Proxy::all(proxy).map_err(|e| Error::InvalidRequest(format!("invalid proxy {proxy}: {e}")))?;
		builder = builder.proxy(proxy);
	}

	builder.build().map_err(|e| Error::Transport(format!("failed to create HTTP client: {e}")))
}

impl Transport for ReqwestTransport {
	fn execute<'a>(&'a self, request: &'a Request) -> ExchangeFuture<'a> {
		Box::pin(async move {
			let client = self.client()?;
			let response = self.prepare(&client, request).send().await?;

			let status = response.status().as_u16();
			let effective_url = response.url().to_string();
			let headers = response
				.headers()
				.iter()
				.map(|(name, value)| (name.as_str().to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
				.collect();
			let body = response.text().await?;

			debug!(target = "probe.transport", url = %effective_url, status, bytes = body.len(), "exchange finished");
			Ok(TransportResponse {
				status,
				headers,
				body,
				effective_url,
			})
		})
	}

	fn refresh(&self) -> Result<()> {
		let client = build_client(&self.settings)?;
		let mut slot = self.client.write();
		if slot.is_some() {
			*slot = Some(client);
			info!(target = "probe.transport", "connection pool recreated");
		}
		Ok(())
	}

	fn close(&self) {
		if self.client.write().take().is_some() {
			debug!(target = "probe.transport", "transport closed");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::request::{Headers, Params, pairs};

	#[test]
	fn get_params_go_to_query_string() {
		let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
		let client = transport.client().unwrap();
		let request = Request::get("http://target.test/search", pairs([("q", "1"), ("__probe__", "")]), Headers::new()).unwrap();
		let built = transport.prepare(&client, &request).build().unwrap();
		assert_eq!(built.url().as_str(), "http://target.test/search?q=1&__probe__=");
	}

	#[test]
	fn empty_cookie_header_is_not_sent() {
		let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
		let client = transport.client().unwrap();
		let request = Request::get("http://target.test/", Params::new(), pairs([("cookie", ""), ("X-Probe", "1")])).unwrap();
		let built = transport.prepare(&client, &request).build().unwrap();
		assert!(built.headers().get("cookie").is_none());
		assert_eq!(built.headers().get("x-probe").unwrap(), "1");
	}

	#[tokio::test]
	async fn closed_transport_refuses_exchanges() {
		let transport = ReqwestTransport::new(&ClientConfig::default()).unwrap();
		transport.close();
		let request = Request::get("http://target.test/", Params::new(), Headers::new()).unwrap();
		let err = transport.execute(&request).await.unwrap_err();
		assert!(matches!(err, Error::Closed));
		transport.refresh().unwrap();
		assert!(transport.client().is_err());
	}
}
