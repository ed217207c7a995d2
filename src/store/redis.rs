//! Redis-backed [`KvBackend`] for production deployments.
//!
//! The connection is opened lazily on the first command and shared by every clone of the
//! owning [`crate::KvStore`]; [`ConnectionManager`] multiplexes concurrent commands over it and
//! reconnects after drops. Each command is bounded by the configured operation timeout.

// crates.io
use ::redis::{
	Client, Cmd, FromRedisValue, RedisError, Value as RedisValue, aio::ConnectionManager, cmd,
};
use async_lock::Mutex as AsyncMutex;
// self
use crate::{
	_prelude::*,
	config::KvConfig,
	error::ConfigError,
	store::{Expiry, KvBackend, StoreError, StoreFuture},
};

/// Shared-store backend speaking to a Redis server.
pub struct RedisBackend {
	client: Client,
	connection: AsyncMutex<Option<ConnectionManager>>,
	timeout: std::time::Duration,
}
impl RedisBackend {
	/// Validates the configuration and prepares a client; no connection is opened yet.
	pub fn new(config: &KvConfig) -> Result<Self, ConfigError> {
		config.validate()?;

		let client = Client::open(config.url.as_str())
			.map_err(|e| ConfigError::ClientBuild { message: e.to_string() })?;
		let timeout = std::time::Duration::from_millis(config.operation_timeout_ms);

		Ok(Self { client, connection: AsyncMutex::new(None), timeout })
	}

	/// Connects if no connection is held yet; cheap and idempotent afterwards.
	async fn connection(&self, operation: &'static str) -> Result<ConnectionManager, StoreError> {
		let mut slot = self.connection.lock().await;

		if let Some(connection) = slot.as_ref() {
			return Ok(connection.clone());
		}

		let connection = tokio::time::timeout(self.timeout, self.client.get_connection_manager())
			.await
			.map_err(|_| self.timed_out(operation))?
			.map_err(|e| classify(operation, e))?;

		*slot = Some(connection.clone());

		Ok(connection)
	}

	async fn run<T>(&self, operation: &'static str, command: Cmd) -> Result<T, StoreError>
	where
		T: FromRedisValue,
	{
		let mut connection = self.connection(operation).await?;

		tokio::time::timeout(self.timeout, command.query_async::<T>(&mut connection))
			.await
			.map_err(|_| self.timed_out(operation))?
			.map_err(|e| classify(operation, e))
	}

	fn timed_out(&self, operation: &'static str) -> StoreError {
		StoreError::Unavailable {
			operation,
			message: format!("no reply within {} ms", self.timeout.as_millis()),
		}
	}
}
impl KvBackend for RedisBackend {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(self.run::<Option<String>>("get", cmd("GET").arg(key).to_owned()))
	}

	fn set<'a>(&'a self, key: &'a str, value: String, expiry: Expiry) -> StoreFuture<'a, ()> {
		Box::pin(self.run::<()>("set", set_command(key, &value, expiry, false)))
	}

	fn set_if_exists<'a>(
		&'a self,
		key: &'a str,
		value: String,
		expiry: Expiry,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			// `SET .. XX` answers nil when the key is gone.
			let reply: RedisValue =
				self.run("set_if_exists", set_command(key, &value, expiry, true)).await?;

			Ok(!matches!(reply, RedisValue::Nil))
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let removed: i64 = self.run("delete", cmd("DEL").arg(key).to_owned()).await?;

			Ok(removed > 0)
		})
	}

	fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let found: i64 = self.run("exists", cmd("EXISTS").arg(key).to_owned()).await?;

			Ok(found > 0)
		})
	}

	fn increment<'a>(&'a self, key: &'a str, amount: i64) -> StoreFuture<'a, i64> {
		Box::pin(self.run::<i64>("increment", cmd("INCRBY").arg(key).arg(amount).to_owned()))
	}

	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let applied: i64 =
				self.run("expire", cmd("PEXPIRE").arg(key).arg(millis(ttl)).to_owned()).await?;

			Ok(applied == 1)
		})
	}

	fn time_to_live<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Duration>> {
		Box::pin(async move {
			// PTTL answers -2 for a missing key and -1 for a key without expiry.
			let remaining: i64 = self.run("time_to_live", cmd("PTTL").arg(key).to_owned()).await?;

			Ok((remaining >= 0).then(|| Duration::milliseconds(remaining)))
		})
	}

	fn add_to_set<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let added: i64 =
				self.run("add_to_set", cmd("SADD").arg(key).arg(member).to_owned()).await?;

			Ok(added > 0)
		})
	}

	fn remove_from_set<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let removed: i64 =
				self.run("remove_from_set", cmd("SREM").arg(key).arg(member).to_owned()).await?;

			Ok(removed > 0)
		})
	}

	fn members_of_set<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>> {
		Box::pin(self.run::<Vec<String>>("members_of_set", cmd("SMEMBERS").arg(key).to_owned()))
	}

	fn add_scored<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		score: f64,
	) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let added: i64 = self
				.run("add_scored", cmd("ZADD").arg(key).arg(score).arg(member).to_owned())
				.await?;

			Ok(added > 0)
		})
	}

	fn pop_highest_score<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<(String, f64)>> {
		Box::pin(async move {
			let mut popped: Vec<(String, f64)> =
				self.run("pop_highest_score", cmd("ZPOPMAX").arg(key).to_owned()).await?;

			Ok(popped.pop())
		})
	}

	fn scored_len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64> {
		Box::pin(self.run::<u64>("scored_len", cmd("ZCARD").arg(key).to_owned()))
	}

	fn push_back<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, u64> {
		Box::pin(self.run::<u64>("push_back", cmd("RPUSH").arg(key).arg(value).to_owned()))
	}

	fn pop_front<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		Box::pin(self.run::<Option<String>>("pop_front", cmd("LPOP").arg(key).to_owned()))
	}

	fn list_len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64> {
		Box::pin(self.run::<u64>("list_len", cmd("LLEN").arg(key).to_owned()))
	}

	fn publish<'a>(&'a self, channel: &'a str, message: String) -> StoreFuture<'a, u64> {
		Box::pin(self.run::<u64>("publish", cmd("PUBLISH").arg(channel).arg(message).to_owned()))
	}

	fn close(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			self.connection.lock().await.take();

			Ok(())
		})
	}
}
impl Debug for RedisBackend {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisBackend").field("timeout", &self.timeout).finish_non_exhaustive()
	}
}

fn set_command(key: &str, value: &str, expiry: Expiry, only_if_exists: bool) -> Cmd {
	let mut command = cmd("SET");

	command.arg(key).arg(value);

	if only_if_exists {
		command.arg("XX");
	}

	match expiry {
		Expiry::Persist => {},
		Expiry::After(ttl) => {
			command.arg("PX").arg(millis(ttl));
		},
		Expiry::Keep => {
			command.arg("KEEPTTL");
		},
	}

	command
}

// Redis rejects non-positive SET PX values, so sub-millisecond TTLs round up to 1 ms.
fn millis(ttl: Duration) -> i64 {
	ttl.whole_milliseconds().clamp(1, i64::MAX as i128) as i64
}

fn classify(operation: &'static str, e: RedisError) -> StoreError {
	let message = e.to_string();

	if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
	{
		StoreError::Unavailable { operation, message }
	} else {
		StoreError::Protocol { operation, message }
	}
}
