use crate::cookies::CookieJar;
use crate::headers::Headers;
use crate::request::Request;

/// Sniff a `charset=` parameter out of a `Content-Type` value. A bare
/// `charset` with no `=` yields `None` rather than an empty string.
pub fn find_encoding(content_type: &str) -> Option<String> {
	if !content_type.to_ascii_lowercase().contains("charset") {
		return None;
	}
	for chunk in content_type.split(';') {
		if chunk.to_ascii_lowercase().contains("charset") {
			let mut parts = chunk.splitn(2, '=');
			parts.next();
			return parts.next().map(|v| v.trim().to_string());
		}
	}
	None
}

/// A completed HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
	pub status_code: u16,
	pub headers: Headers,
	pub cookies: CookieJar,
	pub content: Vec<u8>,
	pub encoding: String,
	pub history: Vec<Response>,
	pub request: Option<Box<Request>>,
}

impl Response {
	pub fn new(status_code: u16, headers: Headers, cookies: CookieJar, content: Vec<u8>, encoding: String) -> Self {
		Response {
			status_code,
			headers,
			cookies,
			content,
			encoding,
			history: Vec::new(),
			request: None,
		}
	}

	/// Decode `content` as text using `encoding`, replacing invalid
	/// sequences rather than failing. Unrecognized encodings fall back
	/// to UTF-8.
	pub fn text(&self) -> String {
		if self.encoding.eq_ignore_ascii_case("utf-8") || self.encoding.eq_ignore_ascii_case("utf8") {
			return String::from_utf8_lossy(&self.content).into_owned();
		}
		let encoding = encoding_rs::Encoding::for_label(self.encoding.as_bytes())
			.unwrap_or(encoding_rs::UTF_8);
		let (decoded, _, _) = encoding.decode(&self.content);
		decoded.into_owned()
	}

	pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
		serde_json::from_slice(&self.content).map_err(|e| crate::error::Error::Other(e.into()))
	}

	pub fn is_redirect(&self) -> bool {
		matches!(self.status_code, 301 | 302 | 303 | 307 | 308)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_charset_in_content_type() {
		assert_eq!(
			find_encoding("text/html; charset=iso-8859-1"),
			Some("iso-8859-1".to_string())
		);
	}

	#[test]
	fn returns_none_without_charset() {
		assert_eq!(find_encoding("application/json"), None);
	}

	#[test]
	fn bare_charset_with_no_equals_is_none() {
		assert_eq!(find_encoding("text/html; charset"), None);
	}

	#[test]
	fn text_decodes_utf8_lossily() {
		let resp = Response::new(200, Headers::new(), CookieJar::new(), b"hi".to_vec(), "utf-8".to_string());
		assert_eq!(resp.text(), "hi");
	}
}
