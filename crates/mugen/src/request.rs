use base64::Engine;
use indexmap::IndexMap;
use url::Url;

use crate::cookies::CookieJar;
use crate::error::{Error, Result};
use crate::headers::Headers;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Anything a caller can hand over as a request body. Dict form gets
/// `application/x-www-form-urlencoded` form-encoding; string/bytes pass
/// through unchanged.
#[derive(Clone, Debug)]
pub enum Body {
	Form(IndexMap<String, String>),
	Text(String),
	Bytes(Vec<u8>),
}

impl Body {
	fn encode(&self) -> Vec<u8> {
		match self {
			Body::Form(map) => form_encode(map).into_bytes(),
			Body::Text(s) => s.as_bytes().to_vec(),
			Body::Bytes(b) => b.clone(),
		}
	}

	fn is_form(&self) -> bool {
		matches!(self, Body::Form(_))
	}
}

fn form_encode(data: &IndexMap<String, String>) -> String {
	data.iter()
		.map(|(k, v)| format!("{}={}", k, percent_encoding::utf8_percent_encode(v, percent_encoding::NON_ALPHANUMERIC)))
		.collect::<Vec<_>>()
		.join("&")
}

/// Default headers every request carries unless overridden.
pub fn default_headers() -> Headers {
	let mut h = Headers::new();
	h.insert("User-Agent", "mugen");
	h.insert("Accept", "*/*");
	h.insert("Accept-Encoding", "deflate, gzip");
	h.insert("Connection", "Keep-Alive");
	h
}

/// Everything needed to format a wire request.
#[derive(Clone, Debug)]
pub struct Request {
	pub method: String,
	pub url: Url,
	pub params: IndexMap<String, String>,
	pub headers: Headers,
	pub body: Option<Body>,
	pub cookies: CookieJar,
	pub proxy: Option<String>,
	pub proxy_auth: Option<(String, String)>,
	pub encoding: Option<String>,
}

impl Request {
	pub fn new(method: &str, url: Url) -> Self {
		Request {
			method: method.to_ascii_uppercase(),
			url,
			params: IndexMap::new(),
			headers: default_headers(),
			body: None,
			cookies: CookieJar::new(),
			proxy: None,
			proxy_auth: None,
			encoding: None,
		}
	}

	pub fn is_tls(&self) -> bool {
		self.url.scheme().eq_ignore_ascii_case("https")
	}

	pub fn host(&self) -> Result<String> {
		self.url
			.host_str()
			.map(str::to_string)
			.ok_or_else(|| Error::InvalidUrl(url::ParseError::EmptyHost))
	}

	pub fn port(&self) -> u16 {
		self.url.port_or_known_default().unwrap_or(if self.is_tls() { 443 } else { 80 })
	}

	/// `path?query`, folding in `params`, empty path normalized to `/`.
	fn path_and_query(&self) -> String {
		let mut path = self.url.path().to_string();
		if path.is_empty() {
			path = "/".to_string();
		}
		let mut query = self.url.query().unwrap_or("").to_string();
		if !self.params.is_empty() {
			let extra: Vec<String> = self.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
			let extra = extra.join("&");
			query = if query.is_empty() { extra } else { format!("{query}&{extra}") };
		}
		if query.is_empty() {
			path
		} else {
			format!("{path}?{query}")
		}
	}

	/// Request-target rules: CONNECT uses bare `host:port`; proxied
	/// non-CONNECT requests use the absolute form; everything else uses
	/// origin form.
	fn request_line(&self) -> String {
		let host = self.url.host_str().unwrap_or_default();
		let port = self.port();

		if self.method.eq_ignore_ascii_case("connect") {
			return format!("{} {}:{} {}", self.method, host, port, HTTP_VERSION);
		}

		let target = if self.proxy.is_some() {
			let scheme = self.url.scheme();
			format!("{scheme}://{}{}", self.url.authority_host_port(), self.path_and_query())
		} else {
			self.path_and_query()
		};
		format!("{} {} {}", self.method, target, HTTP_VERSION)
	}

	fn headers_block(&self, body: &Option<Vec<u8>>) -> String {
		let mut lines = Vec::new();

		if self.headers.get("host").is_none() {
			lines.push(format!("Host: {}", self.url.authority_host_port()));
		}

		if self.method.eq_ignore_ascii_case("post") && body.is_none() {
			lines.push("Content-Length: 0".to_string());
		}

		if let Some(bytes) = body {
			lines.push(format!("Content-Length: {}", bytes.len()));
			if matches!(&self.body, Some(b) if b.is_form()) && self.headers.get("content-type").is_none() {
				lines.push("Content-Type: application/x-www-form-urlencoded".to_string());
			}
		}

		if let Some(cookie_header) = self.cookies.to_cookie_header() {
			lines.push(format!("Cookie: {cookie_header}"));
		}

		if let Some((user, pass)) = &self.proxy_auth {
			let basic = base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
			lines.push(format!("Proxy-Authorization: Basic {basic}"));
			lines.push("Proxy-Connection: Keep-Alive".to_string());
		}

		if !self.headers.is_empty() {
			lines.push(self.headers.to_wire());
		}

		lines.join("\r\n")
	}

	/// Produce `(request_line, headers_block, body_bytes)` ready to be
	/// written to the wire by [`crate::client::send_request`].
	pub fn make_request(&self) -> (String, String, Option<Vec<u8>>) {
		let body = self.body.as_ref().map(Body::encode);
		let request_line = self.request_line();
		let headers_block = self.headers_block(&body);
		(request_line, headers_block, body)
	}
}

trait AuthorityHostPort {
	fn authority_host_port(&self) -> String;
}

impl AuthorityHostPort for Url {
	fn authority_host_port(&self) -> String {
		match self.port() {
			Some(port) => format!("{}:{}", self.host_str().unwrap_or_default(), port),
			None => self.host_str().unwrap_or_default().to_string(),
		}
	}
}
