//! Thread-safe in-process [`KvBackend`] for local development and tests.
//!
//! Mirrors the shared store's command semantics closely enough for every component to run
//! unchanged: lazy TTL expiry, integer counters, sets, sorted sets, lists, and publish. Two
//! test hooks sit on top: [`MemoryBackend::advance`] moves the backend clock forward so
//! TTLs can lapse without sleeping, and [`MemoryBackend::set_offline`] makes every command
//! fail as [`StoreError::Unavailable`].

// std
use std::sync::mpsc::{self, Receiver, Sender};
// self
use crate::{
	_prelude::*,
	store::{Expiry, KvBackend, StoreError, StoreFuture},
};

type Shared = Arc<Mutex<State>>;

/// Thread-safe storage backend that keeps values in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend(Shared);
impl MemoryBackend {
	/// Moves the backend clock forward, expiring any key whose TTL lapses in between.
	pub fn advance(&self, by: Duration) {
		self.0.lock().skew += by;
	}

	/// Simulates an outage; while offline every command fails as unavailable.
	pub fn set_offline(&self, offline: bool) {
		self.0.lock().offline = offline;
	}

	/// Subscribes to a publish channel.
	pub fn subscribe(&self, channel: impl Into<String>) -> Receiver<String> {
		let (tx, rx) = mpsc::channel();

		self.0.lock().subscribers.entry(channel.into()).or_default().push(tx);

		rx
	}

	/// Number of live keys, expired ones excluded.
	pub fn len(&self) -> usize {
		let mut state = self.0.lock();
		let now = state.now();

		state.entries.retain(|_, entry| !entry.expired_at(now));
		state.entries.len()
	}

	/// Returns `true` when no live key exists.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn run<T, F>(&self, operation: &'static str, f: F) -> StoreFuture<'_, T>
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(&mut State, OffsetDateTime) -> Result<T, StoreError>,
	{
		let shared = self.0.clone();

		Box::pin(async move {
			let mut state = shared.lock();

			if state.offline {
				return Err(StoreError::Unavailable {
					operation,
					message: "memory backend is offline".into(),
				});
			}

			let now = state.now();

			f(&mut state, now)
		})
	}
}
impl KvBackend for MemoryBackend {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let key = key.to_owned();

		self.run("get", move |state, now| match state.live(&key, now) {
			Some(Entry { slot: Slot::Text(value), .. }) => Ok(Some(value.clone())),
			Some(_) => Err(wrong_type("get")),
			None => Ok(None),
		})
	}

	fn set<'a>(&'a self, key: &'a str, value: String, expiry: Expiry) -> StoreFuture<'a, ()> {
		let key = key.to_owned();

		self.run("set", move |state, now| {
			let expires_at = match expiry {
				Expiry::Persist => None,
				Expiry::After(ttl) => Some(now + ttl),
				Expiry::Keep => state.live(&key, now).and_then(|entry| entry.expires_at),
			};

			state.entries.insert(key, Entry { slot: Slot::Text(value), expires_at });

			Ok(())
		})
	}

	fn set_if_exists<'a>(
		&'a self,
		key: &'a str,
		value: String,
		expiry: Expiry,
	) -> StoreFuture<'a, bool> {
		let key = key.to_owned();

		self.run("set_if_exists", move |state, now| {
			let Some(entry) = state.live(&key, now) else {
				return Ok(false);
			};

			entry.slot = Slot::Text(value);

			match expiry {
				Expiry::Persist => entry.expires_at = None,
				Expiry::After(ttl) => entry.expires_at = Some(now + ttl),
				Expiry::Keep => {},
			}

			Ok(true)
		})
	}

	fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		let key = key.to_owned();

		self.run("delete", move |state, now| {
			let existed = state.live(&key, now).is_some();

			state.entries.remove(&key);

			Ok(existed)
		})
	}

	fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		let key = key.to_owned();

		self.run("exists", move |state, now| Ok(state.live(&key, now).is_some()))
	}

	fn increment<'a>(&'a self, key: &'a str, amount: i64) -> StoreFuture<'a, i64> {
		let key = key.to_owned();

		self.run("increment", move |state, now| {
			let entry = state.live_or_insert(&key, now, || Slot::Text("0".into()));
			let Slot::Text(value) = &mut entry.slot else {
				return Err(wrong_type("increment"));
			};
			let current = value.parse::<i64>().map_err(|_| StoreError::Protocol {
				operation: "increment",
				message: "value is not an integer".into(),
			})?;
			let next = current.checked_add(amount).ok_or_else(|| StoreError::Protocol {
				operation: "increment",
				message: "increment would overflow".into(),
			})?;

			*value = next.to_string();

			Ok(next)
		})
	}

	fn expire<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, bool> {
		let key = key.to_owned();

		self.run("expire", move |state, now| {
			if state.live(&key, now).is_none() {
				return Ok(false);
			}
			if !ttl.is_positive() {
				state.entries.remove(&key);

				return Ok(true);
			}
			if let Some(entry) = state.entries.get_mut(&key) {
				entry.expires_at = Some(now + ttl);
			}

			Ok(true)
		})
	}

	fn time_to_live<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Duration>> {
		let key = key.to_owned();

		self.run("time_to_live", move |state, now| {
			Ok(state.live(&key, now).and_then(|entry| entry.expires_at).map(|at| at - now))
		})
	}

	fn add_to_set<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
		let key = key.to_owned();
		let member = member.to_owned();

		self.run("add_to_set", move |state, now| {
			match &mut state.live_or_insert(&key, now, || Slot::Set(HashSet::new())).slot {
				Slot::Set(members) => Ok(members.insert(member)),
				_ => Err(wrong_type("add_to_set")),
			}
		})
	}

	fn remove_from_set<'a>(&'a self, key: &'a str, member: &'a str) -> StoreFuture<'a, bool> {
		let key = key.to_owned();
		let member = member.to_owned();

		self.run("remove_from_set", move |state, now| {
			let removed = match state.live(&key, now) {
				Some(Entry { slot: Slot::Set(members), .. }) => members.remove(&member),
				Some(_) => return Err(wrong_type("remove_from_set")),
				None => false,
			};

			state.drop_if_empty(&key);

			Ok(removed)
		})
	}

	fn members_of_set<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<String>> {
		let key = key.to_owned();

		self.run("members_of_set", move |state, now| match state.live(&key, now) {
			Some(Entry { slot: Slot::Set(members), .. }) => Ok(members.iter().cloned().collect()),
			Some(_) => Err(wrong_type("members_of_set")),
			None => Ok(Vec::new()),
		})
	}

	fn add_scored<'a>(
		&'a self,
		key: &'a str,
		member: &'a str,
		score: f64,
	) -> StoreFuture<'a, bool> {
		let key = key.to_owned();
		let member = member.to_owned();

		self.run("add_scored", move |state, now| {
			if score.is_nan() {
				return Err(StoreError::Protocol {
					operation: "add_scored",
					message: "score is not a number".into(),
				});
			}

			match &mut state.live_or_insert(&key, now, || Slot::Scored(HashMap::new())).slot {
				Slot::Scored(members) => Ok(members.insert(member, score).is_none()),
				_ => Err(wrong_type("add_scored")),
			}
		})
	}

	fn pop_highest_score<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<(String, f64)>> {
		let key = key.to_owned();

		self.run("pop_highest_score", move |state, now| {
			let popped = match state.live(&key, now) {
				Some(Entry { slot: Slot::Scored(members), .. }) => {
					// Ties resolve to the lexicographically greatest member, as ZPOPMAX does.
					let best = members
						.iter()
						.max_by(|(a_member, a_score), (b_member, b_score)| {
							a_score.total_cmp(b_score).then_with(|| a_member.cmp(b_member))
						})
						.map(|(member, _)| member.clone());

					best.and_then(|member| members.remove_entry(&member))
				},
				Some(_) => return Err(wrong_type("pop_highest_score")),
				None => None,
			};

			state.drop_if_empty(&key);

			Ok(popped)
		})
	}

	fn scored_len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64> {
		let key = key.to_owned();

		self.run("scored_len", move |state, now| match state.live(&key, now) {
			Some(Entry { slot: Slot::Scored(members), .. }) => Ok(members.len() as u64),
			Some(_) => Err(wrong_type("scored_len")),
			None => Ok(0),
		})
	}

	fn push_back<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, u64> {
		let key = key.to_owned();

		self.run("push_back", move |state, now| {
			match &mut state.live_or_insert(&key, now, || Slot::List(VecDeque::new())).slot {
				Slot::List(values) => {
					values.push_back(value);

					Ok(values.len() as u64)
				},
				_ => Err(wrong_type("push_back")),
			}
		})
	}

	fn pop_front<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let key = key.to_owned();

		self.run("pop_front", move |state, now| {
			let popped = match state.live(&key, now) {
				Some(Entry { slot: Slot::List(values), .. }) => values.pop_front(),
				Some(_) => return Err(wrong_type("pop_front")),
				None => None,
			};

			state.drop_if_empty(&key);

			Ok(popped)
		})
	}

	fn list_len<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64> {
		let key = key.to_owned();

		self.run("list_len", move |state, now| match state.live(&key, now) {
			Some(Entry { slot: Slot::List(values), .. }) => Ok(values.len() as u64),
			Some(_) => Err(wrong_type("list_len")),
			None => Ok(0),
		})
	}

	fn publish<'a>(&'a self, channel: &'a str, message: String) -> StoreFuture<'a, u64> {
		let channel = channel.to_owned();

		self.run("publish", move |state, _| {
			let Some(subscribers) = state.subscribers.get_mut(&channel) else {
				return Ok(0);
			};

			subscribers.retain(|tx| tx.send(message.clone()).is_ok());

			Ok(subscribers.len() as u64)
		})
	}

	fn close(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

#[derive(Debug, Default)]
struct State {
	entries: HashMap<String, Entry>,
	subscribers: HashMap<String, Vec<Sender<String>>>,
	skew: Duration,
	offline: bool,
}
impl State {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc() + self.skew
	}

	fn live(&mut self, key: &str, now: OffsetDateTime) -> Option<&mut Entry> {
		if self.entries.get(key).is_some_and(|entry| entry.expired_at(now)) {
			self.entries.remove(key);
		}

		self.entries.get_mut(key)
	}

	fn live_or_insert(
		&mut self,
		key: &str,
		now: OffsetDateTime,
		init: impl FnOnce() -> Slot,
	) -> &mut Entry {
		if self.entries.get(key).is_some_and(|entry| entry.expired_at(now)) {
			self.entries.remove(key);
		}

		self.entries.entry(key.to_owned()).or_insert_with(|| Entry { slot: init(), expires_at: None })
	}

	fn drop_if_empty(&mut self, key: &str) {
		let empty = match self.entries.get(key).map(|entry| &entry.slot) {
			Some(Slot::Set(members)) => members.is_empty(),
			Some(Slot::Scored(members)) => members.is_empty(),
			Some(Slot::List(values)) => values.is_empty(),
			_ => false,
		};

		if empty {
			self.entries.remove(key);
		}
	}
}

#[derive(Debug)]
struct Entry {
	slot: Slot,
	expires_at: Option<OffsetDateTime>,
}
impl Entry {
	fn expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|at| at <= now)
	}
}

#[derive(Debug)]
enum Slot {
	Text(String),
	Set(HashSet<String>),
	Scored(HashMap<String, f64>),
	List(VecDeque<String>),
}

fn wrong_type(operation: &'static str) -> StoreError {
	StoreError::Protocol {
		operation,
		message: "operation against a key holding the wrong kind of value".into(),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn ttl_lapses_when_the_clock_advances() {
		let backend = MemoryBackend::default();

		backend
			.set("k", "v".into(), Expiry::After(Duration::seconds(5)))
			.await
			.expect("Set should succeed.");

		let ttl = backend
			.time_to_live("k")
			.await
			.expect("TTL read should succeed.")
			.expect("Key should carry a TTL.");

		assert!(ttl <= Duration::seconds(5) && ttl > Duration::seconds(4));

		backend.advance(Duration::seconds(5));

		assert_eq!(backend.get("k").await.expect("Get should succeed."), None);
		assert!(backend.is_empty());
	}

	#[tokio::test]
	async fn keep_expiry_preserves_the_existing_ttl() {
		let backend = MemoryBackend::default();

		backend
			.set("k", "1".into(), Expiry::After(Duration::seconds(30)))
			.await
			.expect("Set should succeed.");
		backend.set("k", "2".into(), Expiry::Keep).await.expect("Set should succeed.");

		assert!(backend.time_to_live("k").await.expect("TTL read should succeed.").is_some());

		backend.set("k", "3".into(), Expiry::Persist).await.expect("Set should succeed.");

		assert_eq!(backend.time_to_live("k").await.expect("TTL read should succeed."), None);
	}

	#[tokio::test]
	async fn conditional_set_never_revives_a_lapsed_key() {
		let backend = MemoryBackend::default();

		backend
			.set("k", "1".into(), Expiry::After(Duration::seconds(30)))
			.await
			.expect("Set should succeed.");

		assert!(backend.set_if_exists("k", "2".into(), Expiry::Keep).await.expect("Set works."));
		assert_eq!(backend.get("k").await.expect("Get should succeed."), Some("2".into()));
		assert!(backend.time_to_live("k").await.expect("TTL read should succeed.").is_some());

		backend.advance(Duration::seconds(31));

		assert!(!backend.set_if_exists("k", "3".into(), Expiry::Keep).await.expect("Set works."));
		assert!(
			!backend
				.set_if_exists("k", "4".into(), Expiry::After(Duration::hours(1)))
				.await
				.expect("Set works.")
		);
		assert!(backend.is_empty());
	}

	#[tokio::test]
	async fn increment_keeps_ttl_and_rejects_non_integers() {
		let backend = MemoryBackend::default();

		assert_eq!(backend.increment("c", 1).await.expect("Increment should succeed."), 1);
		backend.expire("c", Duration::seconds(10)).await.expect("Expire should succeed.");
		assert_eq!(backend.increment("c", 2).await.expect("Increment should succeed."), 3);
		assert!(backend.time_to_live("c").await.expect("TTL read should succeed.").is_some());

		backend.set("t", "text".into(), Expiry::Persist).await.expect("Set should succeed.");

		let err = backend.increment("t", 1).await.expect_err("Text should not increment.");

		assert!(matches!(err, StoreError::Protocol { operation: "increment", .. }));
	}

	#[tokio::test]
	async fn wrong_kind_is_a_protocol_error() {
		let backend = MemoryBackend::default();

		backend.add_to_set("s", "a").await.expect("Set add should succeed.");

		let err = backend.push_back("s", "x".into()).await.expect_err("Set is not a list.");

		assert!(matches!(err, StoreError::Protocol { operation: "push_back", .. }));
	}

	#[tokio::test]
	async fn emptied_collections_disappear() {
		let backend = MemoryBackend::default();

		backend.push_back("l", "a".into()).await.expect("Push should succeed.");
		backend.pop_front("l").await.expect("Pop should succeed.");

		assert!(!backend.exists("l").await.expect("Exists should succeed."));

		backend.add_scored("z", "a", 1.0).await.expect("Add should succeed.");
		backend.pop_highest_score("z").await.expect("Pop should succeed.");

		assert!(!backend.exists("z").await.expect("Exists should succeed."));
	}

	#[tokio::test]
	async fn publish_reaches_live_subscribers_only() {
		let backend = MemoryBackend::default();
		let rx = backend.subscribe("events");

		assert_eq!(backend.publish("events", "hello".into()).await.expect("Publish works."), 1);
		assert_eq!(rx.try_recv().expect("Message should be delivered."), "hello");

		drop(rx);

		assert_eq!(backend.publish("events", "again".into()).await.expect("Publish works."), 0);
		assert_eq!(backend.publish("other", "x".into()).await.expect("Publish works."), 0);
	}

	#[tokio::test]
	async fn offline_backend_fails_every_command() {
		let backend = MemoryBackend::default();

		backend.set_offline(true);

		assert!(matches!(
			backend.get("k").await,
			Err(StoreError::Unavailable { operation: "get", .. })
		));

		backend.set_offline(false);

		assert_eq!(backend.get("k").await.expect("Get should succeed once online."), None);
	}
}
