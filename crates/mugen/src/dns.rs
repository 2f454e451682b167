use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};

use hashbrown::HashMap;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::Resolver;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

type Key = (String, u16);

/// FIFO-bounded `(host, port) -> ip` cache sitting in front of
/// `hickory-resolver`. Literal IP hosts short-circuit without touching
/// the resolver or the cache at all.
pub struct DnsCache {
	resolver: Resolver<hickory_resolver::name_server::TokioConnectionProvider>,
	entries: Mutex<HashMap<Key, IpAddr>>,
	order: Mutex<VecDeque<Key>>,
	capacity: usize,
}

impl DnsCache {
	pub fn new(capacity: usize) -> Result<Self> {
		let resolver = Resolver::tokio(ResolverConfig::default(), ResolverOpts::default());
		Ok(DnsCache {
			resolver,
			entries: Mutex::new(HashMap::new()),
			order: Mutex::new(VecDeque::new()),
			capacity,
		})
	}

	/// Resolve `host:port`, consulting (and refreshing) the cache. A
	/// literal IP address in `host` bypasses the cache entirely.
	pub async fn get(&self, host: &str, port: u16) -> Result<SocketAddr> {
		if let Ok(ip) = host.parse::<IpAddr>() {
			return Ok(SocketAddr::new(ip, port));
		}

		let key = (host.to_string(), port);
		if let Some(ip) = self.entries.lock().get(&key).copied() {
			return Ok(SocketAddr::new(ip, port));
		}

		let ip = self.resolve(host).await?;
		self.insert(key, ip);
		Ok(SocketAddr::new(ip, port))
	}

	/// Force a fresh lookup, bypassing (and then repopulating) the cache.
	pub async fn refresh(&self, host: &str, port: u16) -> Result<SocketAddr> {
		if let Ok(ip) = host.parse::<IpAddr>() {
			return Ok(SocketAddr::new(ip, port));
		}
		let ip = self.resolve(host).await?;
		self.insert((host.to_string(), port), ip);
		Ok(SocketAddr::new(ip, port))
	}

	async fn resolve(&self, host: &str) -> Result<IpAddr> {
		debug!(host, "resolving");
		let response = self
			.resolver
			.lookup_ip(host)
			.await
			.map_err(|_| Error::ResolveFailed { host: host.to_string(), port: 0 })?;

		// Only A (IPv4) records are usable; AAAA-only answers fail outright
		// rather than falling back to a family the rest of the stack
		// doesn't dial.
		for ip in response.iter() {
			if ip.is_ipv4() {
				return Ok(ip);
			}
		}
		Err(Error::ResolveFailed { host: host.to_string(), port: 0 })
	}

	fn insert(&self, key: Key, ip: IpAddr) {
		let mut entries = self.entries.lock();
		let mut order = self.order.lock();

		if !entries.contains_key(&key) {
			order.push_back(key.clone());
		}
		entries.insert(key, ip);

		while entries.len() > self.capacity {
			if let Some(oldest) = order.pop_front() {
				entries.remove(&oldest);
			} else {
				break;
			}
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
		self.order.lock().clear();
	}
}
