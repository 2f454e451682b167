use std::time::Duration;

use mugen_core::time::{serde_dur, serde_dur_option};
use serde::{Deserialize, Serialize};

pub const MAX_CONNECTION_POOL: usize = 100;
pub const MAX_POOL_TASKS: usize = 100;
pub const MAX_REDIRECTIONS: usize = 1_000;
pub const CONN_READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const KEEP_ALIVE_CEILING: Duration = Duration::from_secs(600);
pub const DNS_CACHE_MAX: usize = 5_000;
pub const DEFAULT_ENCODING: &str = "utf-8";

/// Caller-tunable knobs. A caller building a [`crate::session::Session`]
/// only needs to override what they care about (see `Config::default()`
/// and the builder-style setters).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	pub max_pool: usize,
	pub max_tasks: usize,
	pub max_redirects: usize,
	#[serde(with = "serde_dur")]
	pub conn_read_timeout: Duration,
	#[serde(with = "serde_dur")]
	pub keep_alive_ceiling: Duration,
	pub dns_cache_size: usize,
	pub recycle: bool,
	#[serde(with = "serde_dur_option")]
	pub request_timeout: Option<Duration>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			max_pool: MAX_CONNECTION_POOL,
			max_tasks: MAX_POOL_TASKS,
			max_redirects: MAX_REDIRECTIONS,
			conn_read_timeout: CONN_READ_TIMEOUT,
			keep_alive_ceiling: KEEP_ALIVE_CEILING,
			dns_cache_size: DNS_CACHE_MAX,
			recycle: true,
			request_timeout: None,
		}
	}
}
