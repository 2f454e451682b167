//! One-shot free functions for callers that don't need a long-lived
//! [`Session`]. Each call builds a throwaway session, so no connection
//! pooling happens across calls — reach for [`Session`] directly when
//! that matters.

use crate::config::Config;
use crate::error::Result;
use crate::response::Response;
use crate::session::{RequestOptions, Session};

pub async fn request(method: &str, url: &str, opts: RequestOptions) -> Result<Response> {
	let mut session = Session::new(&Config::default())?;
	session.request(method, url, opts).await
}

pub async fn get(url: &str, opts: RequestOptions) -> Result<Response> {
	request("GET", url, opts).await
}

pub async fn post(url: &str, opts: RequestOptions) -> Result<Response> {
	request("POST", url, opts).await
}

pub async fn head(url: &str, opts: RequestOptions) -> Result<Response> {
	let mut opts = opts;
	opts.allow_redirects = false;
	request("HEAD", url, opts).await
}

pub fn session(config: &Config) -> Result<Session> {
	Session::new(config)
}
