use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, warn};
use url::Url;

use crate::client::Adapter;
use crate::config::Config;
use crate::cookies::CookieJar;
use crate::dns::DnsCache;
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::pool::ConnectionPool;
use crate::request::{Body, Request};
use crate::response::Response;

/// Stateful entry point: owns a connection pool, DNS cache, default
/// headers, and a shared cookie jar across every call.
pub struct Session {
	headers: Headers,
	cookies: CookieJar,
	recycle: bool,
	encoding: Option<String>,
	max_redirects: usize,
	adapter: Adapter,
}

/// Per-call overrides to a [`Session`]'s defaults, one field per
/// optional argument `request`/`get`/`post`/`head` accept.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
	pub params: IndexMap<String, String>,
	pub headers: Option<Headers>,
	pub body: Option<Body>,
	pub cookies: Option<CookieJar>,
	pub proxy: Option<String>,
	pub proxy_auth: Option<(String, String)>,
	pub allow_redirects: bool,
	pub recycle: Option<bool>,
	pub encoding: Option<String>,
	pub timeout: Option<std::time::Duration>,
}

impl RequestOptions {
	pub fn new() -> Self {
		RequestOptions {
			allow_redirects: true,
			..Default::default()
		}
	}
}

impl Session {
	pub fn new(config: &Config) -> Result<Self> {
		debug!(max_pool = config.max_pool, max_tasks = config.max_tasks, recycle = config.recycle, "instantiate Session");
		let pool = ConnectionPool::new(config);
		let dns = DnsCache::new(config.dns_cache_size)?;
		Ok(Session {
			headers: Headers::new(),
			cookies: CookieJar::new(),
			recycle: config.recycle,
			encoding: None,
			max_redirects: config.max_redirects,
			adapter: Adapter::new(pool, dns),
		})
	}

	pub fn set_headers(&mut self, headers: Headers) {
		self.headers = headers;
	}

	pub fn cookies(&self) -> &CookieJar {
		&self.cookies
	}

	/// Top-level entry point: optionally follows redirects under a single
	/// overall timeout spanning the whole chain, not per hop.
	pub async fn request(&mut self, method: &str, url: &str, opts: RequestOptions) -> Result<Response> {
		let timeout = opts.timeout;
		let work = async {
			if opts.allow_redirects {
				self.redirect_loop(method, url, opts).await
			} else {
				self.execute(method, url, &opts).await
			}
		};

		match timeout {
			Some(d) => tokio::time::timeout(d, work).await.map_err(|_| Error::Timeout)?,
			None => work.await,
		}
	}

	async fn redirect_loop(&mut self, method: &str, url: &str, opts: RequestOptions) -> Result<Response> {
		let mut history = Vec::new();
		let mut current = url.to_string();
		let mut base = url.to_string();
		let mut seen: HashSet<String> = HashSet::new();

		loop {
			if seen.len() > self.max_redirects {
				return Err(Error::TooManyRedirections(self.max_redirects));
			}
			seen.insert(current.clone());

			let mut response = self.execute(method, &current, &opts).await?;

			let location = response.headers.get("location").map(str::to_string);
			let Some(location) = location else {
				response.history = std::mem::take(&mut history);
				return Ok(response);
			};

			let next = Url::parse(&base)
				.and_then(|b| b.join(&location))
				.map_err(Error::InvalidUrl)?
				.to_string();
			base = next.clone();

			if seen.contains(&next) {
				return Err(Error::RedirectLoop(next));
			}

			history.push(response);
			current = next;
		}
	}

	/// Build the wire request, send it, receive the response, merge
	/// cookies, and recycle the connection.
	async fn execute(&mut self, method: &str, url: &str, opts: &RequestOptions) -> Result<Response> {
		let encoding = opts.encoding.clone().or_else(|| self.encoding.clone());
		let recycle = opts.recycle.unwrap_or(self.recycle);

		if let Some(extra) = &opts.cookies {
			self.cookies.update(extra);
		}

		let parsed_url = Url::parse(url).map_err(Error::InvalidUrl)?;
		let mut request = Request::new(method, parsed_url);
		request.params = opts.params.clone();
		// A non-empty per-call or session header set replaces the request's
		// built-in defaults entirely, rather than merging with them.
		let chosen_headers = opts.headers.clone().filter(|h| !h.is_empty()).or_else(|| {
			if self.headers.is_empty() {
				None
			} else {
				Some(self.headers.clone())
			}
		});
		if let Some(headers) = chosen_headers {
			request.headers = headers;
		}
		request.body = opts.body.clone();
		request.cookies = self.cookies.clone();
		request.proxy = opts.proxy.clone();
		request.proxy_auth = opts.proxy_auth.clone();
		request.encoding = encoding.clone();

		let mut conn = self.adapter.connection_for(&request, Some(recycle)).await?;

		if let Err(e) = self.adapter.send_request(&mut conn, &request).await {
			warn!(error = %e, "closing connection after send_request failure");
			conn.close();
			return Err(e);
		}

		let response = match self.adapter.recv_response(method, &mut conn, encoding).await {
			Ok(r) => r,
			Err(e) => {
				warn!(error = %e, "closing connection after recv_response failure");
				conn.close();
				return Err(e);
			},
		};

		self.cookies.update(&response.cookies);
		let mut response = response;
		response.cookies = self.cookies.clone();
		response.request = Some(Box::new(request));

		if !method.eq_ignore_ascii_case("connect") {
			conn.close();
		}

		Ok(response)
	}

	pub async fn head(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
		let mut opts = opts;
		opts.allow_redirects = false;
		self.request("HEAD", url, opts).await
	}

	pub async fn get(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
		self.request("GET", url, opts).await
	}

	pub async fn post(&mut self, url: &str, opts: RequestOptions) -> Result<Response> {
		self.request("POST", url, opts).await
	}

	/// Reset cookies and headers to empty. The session stays usable.
	pub fn clear(&mut self) {
		self.cookies.clear();
		self.headers = Headers::new();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn request_options_default_follows_redirects() {
		let opts = RequestOptions::new();
		assert!(opts.allow_redirects);
	}
}
