use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::config::Config;
use crate::connection::Connection;
use crate::endpoint::EndpointKey;

/// Idle-connection multimap, keyed by [`EndpointKey`], with per-key and
/// global caps, a keep-alive sweeper, and a single background watcher per
/// pool instance.
///
/// This is an explicitly-owned value a [`crate::session::Session`] holds
/// by `Arc`, rather than a process-wide singleton, so two independent
/// sessions never share state by accident.
#[derive(Clone)]
pub struct ConnectionPool {
	inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
	buckets: Mutex<HashMap<EndpointKey, VecDeque<Connection>>>,
	max_pool: usize,
	max_tasks: usize,
	keep_alive_ceiling: Duration,
	default_recycle: bool,
	watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionPool {
	pub fn new(cfg: &Config) -> Self {
		let inner = Arc::new(PoolInner {
			buckets: Mutex::new(HashMap::new()),
			max_pool: cfg.max_pool,
			max_tasks: cfg.max_tasks,
			keep_alive_ceiling: cfg.keep_alive_ceiling,
			default_recycle: cfg.recycle,
			watcher: Mutex::new(None),
		});

		let weak = Arc::downgrade(&inner);
		let handle = tokio::spawn(keep_alive_watcher(weak, inner.keep_alive_ceiling));
		*inner.watcher.lock() = Some(handle);

		ConnectionPool { inner }
	}

	/// Produce a connection for `key`, drawing from idle storage when
	/// `recycle` allows it. Never suspends: the only awaitable step is
	/// the dial the caller performs afterwards via
	/// [`Connection::connect`].
	pub fn acquire(
		&self,
		key: EndpointKey,
		peer: SocketAddr,
		direct_tls: bool,
		recycle: Option<bool>,
	) -> Connection {
		let recycle = recycle.unwrap_or(self.inner.default_recycle);
		let weak = Arc::downgrade(&self.inner);

		if !recycle {
			return Connection::new(key, peer, direct_tls, false, self.inner.keep_alive_ceiling, weak);
		}

		loop {
			let popped = {
				let mut buckets = self.inner.buckets.lock();
				let (popped, now_empty) = match buckets.get_mut(&key) {
					Some(bucket) => (bucket.pop_front(), bucket.is_empty()),
					None => (None, false),
				};
				if now_empty {
					buckets.remove(&key);
				}
				popped
			};

			match popped {
				Some(mut conn) => {
					if !conn.stale() {
						debug!(%key, "reusing pooled connection");
						return conn;
					}
					conn.close_hard();
					continue;
				},
				None => break,
			}
		}

		debug!(%key, "no idle connection available, creating new one");
		Connection::new(key, peer, direct_tls, true, self.inner.keep_alive_ceiling, weak)
	}

	/// Return a connection to idle storage if it's recycleable, not
	/// stale, and not over the keep-alive ceiling; otherwise tear it
	/// down.
	pub fn release(&self, mut conn: Connection) {
		if conn.recycle_allowed && !conn.stale() && !conn.is_timeout() {
			let key = conn.key.clone();
			if let Err(mut returned) = self.inner.try_store(key, conn) {
				returned.close_hard();
			}
		} else {
			conn.close_hard();
		}
	}

	/// Requeue every idle entry through the same admission check as
	/// `release`, dropping stale/timed-out connections and removing
	/// now-empty buckets.
	pub fn sweep(&self) {
		self.inner.sweep();
	}

	/// Number of distinct endpoint-key buckets currently holding at
	/// least one idle connection.
	pub fn len(&self) -> usize {
		self.inner.buckets.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Close every idle connection and forget all buckets.
	pub fn clear(&self) {
		let mut buckets = self.inner.buckets.lock();
		for (_key, mut conns) in buckets.drain() {
			while let Some(mut conn) = conns.pop_front() {
				conn.close_hard();
			}
		}
	}

	/// Stop the background sweeper. Idempotent.
	pub fn close(&self) {
		self.clear();
		if let Some(handle) = self.inner.watcher.lock().take() {
			handle.abort();
		}
	}
}

impl PoolInner {
	/// Admit `conn` into `buckets[key]` if under both the per-key and
	/// global caps (`len(buckets[key]) < max_tasks and len(buckets) <
	/// max_pool`), returning it back to the caller on rejection so they
	/// can tear it down. The bucket is created (possibly empty, then
	/// removed again on rejection) before the capacity check runs, so a
	/// brand-new key already counts toward the global total the moment
	/// it's looked up.
	pub(crate) fn try_store(
		&self,
		key: EndpointKey,
		conn: Connection,
	) -> Result<(), Connection> {
		let mut buckets = self.buckets.lock();
		let bucket = buckets.entry(key.clone()).or_insert_with(VecDeque::new);
		if bucket.len() < self.max_tasks && buckets.len() < self.max_pool {
			buckets.get_mut(&key).expect("just inserted").push_back(conn);
			Ok(())
		} else {
			if let Some(b) = buckets.get(&key) {
				if b.is_empty() {
					buckets.remove(&key);
				}
			}
			Err(conn)
		}
	}

	fn sweep(&self) {
		let drained: Vec<(EndpointKey, VecDeque<Connection>)> = {
			let mut buckets = self.buckets.lock();
			std::mem::take(&mut *buckets).into_iter().collect()
		};

		for (key, mut conns) in drained {
			while let Some(mut conn) = conns.pop_front() {
				if conn.recycle_allowed && !conn.stale() && !conn.is_timeout() {
					if let Err(mut c) = self.try_store(key.clone(), conn) {
						c.close_hard();
					}
				} else {
					conn.close_hard();
				}
			}
		}
	}
}

async fn keep_alive_watcher(pool: Weak<PoolInner>, interval: Duration) {
	loop {
		tokio::time::sleep(interval).await;
		let Some(inner) = pool.upgrade() else {
			debug!("connection pool dropped, stopping keep-alive watcher");
			return;
		};
		// A panic inside sweep() shouldn't kill the watcher task; log and keep going.
		if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| inner.sweep())).is_err() {
			error!("keep-alive sweep panicked");
		}
	}
}
