//! Work-queue hand-off between request handlers and background workers.
//!
//! A logical queue has two physical shapes: a list under `queue:{name}` served in FIFO order,
//! and a sorted set under `queue:{name}:priority` served highest score first. [`WorkQueues`]
//! routes by priority the way producers historically did; [`FifoQueue`] and
//! [`PriorityQueue`] pin one shape per handle so producers and consumers cannot disagree.
//!
//! Delivery is at most once: a popped item is gone from the store even if the consumer then
//! fails. Sorted-set members are unique, so pushing an identical payload twice to a priority
//! queue keeps one entry (with the latest score).

// std
use std::marker::PhantomData;
// self
use crate::{
	_prelude::*,
	id::QueueName,
	keys,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{self, KvStore, StoreError},
};

/// Physical shape to pop from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueShape {
	/// Plain list, oldest first.
	Fifo,
	/// Sorted set, highest priority first.
	Priority,
}

/// Untyped queue access over the shared store.
#[derive(Clone, Debug)]
pub struct WorkQueues {
	store: KvStore,
}
impl WorkQueues {
	/// Wraps the shared store.
	pub fn new(store: KvStore) -> Self {
		Self { store }
	}

	/// Enqueues a JSON item. A positive `priority` routes it to the sorted set with that
	/// score; anything else appends it to the list.
	pub async fn push(&self, queue: &QueueName, item: &Value, priority: f64) -> Result<()> {
		if priority > 0.0 {
			push_scored(&self.store, &keys::queue_priority(queue), item, priority).await
		} else {
			push_listed(&self.store, &keys::queue(queue), item).await.map(|_| ())
		}
	}

	/// Dequeues one item from the requested shape.
	///
	/// An unreachable store reads as an empty queue. An item that is not valid JSON is
	/// consumed and reported as a decode error.
	pub async fn pop(&self, queue: &QueueName, shape: QueueShape) -> Result<Option<Value>> {
		let popped = match shape {
			QueueShape::Fifo => pop_listed(&self.store, &keys::queue(queue)).await,
			QueueShape::Priority => pop_scored(&self.store, &keys::queue_priority(queue)).await,
		};

		Ok(popped?)
	}

	/// Typed handle over the queue's list.
	pub fn fifo<T>(&self, queue: &QueueName) -> FifoQueue<T> {
		FifoQueue { store: self.store.clone(), key: keys::queue(queue), item: PhantomData }
	}

	/// Typed handle over the queue's sorted set.
	pub fn priority<T>(&self, queue: &QueueName) -> PriorityQueue<T> {
		PriorityQueue {
			store: self.store.clone(),
			key: keys::queue_priority(queue),
			item: PhantomData,
		}
	}
}

/// Typed FIFO queue handle.
pub struct FifoQueue<T> {
	store: KvStore,
	key: String,
	item: PhantomData<fn() -> T>,
}
impl<T> FifoQueue<T>
where
	T: Serialize + DeserializeOwned,
{
	/// Appends an item, returning the queue length afterwards.
	pub async fn push(&self, item: &T) -> Result<u64> {
		push_listed(&self.store, &self.key, item).await
	}

	/// Takes the oldest item; an unreachable store reads as empty.
	pub async fn pop(&self) -> Result<Option<T>, StoreError> {
		pop_listed(&self.store, &self.key).await
	}

	/// Number of queued items.
	pub async fn len(&self) -> Result<u64, StoreError> {
		self.store.list_len(&self.key).await
	}

	/// Returns `true` when nothing is queued.
	pub async fn is_empty(&self) -> Result<bool, StoreError> {
		Ok(self.len().await? == 0)
	}
}
impl<T> Clone for FifoQueue<T> {
	fn clone(&self) -> Self {
		Self { store: self.store.clone(), key: self.key.clone(), item: PhantomData }
	}
}
impl<T> Debug for FifoQueue<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FifoQueue").field("key", &self.key).finish()
	}
}

/// Typed priority queue handle.
pub struct PriorityQueue<T> {
	store: KvStore,
	key: String,
	item: PhantomData<fn() -> T>,
}
impl<T> PriorityQueue<T>
where
	T: Serialize + DeserializeOwned,
{
	/// Inserts an item with the given score; higher scores pop first.
	pub async fn push(&self, item: &T, priority: f64) -> Result<()> {
		push_scored(&self.store, &self.key, item, priority).await
	}

	/// Takes the highest-priority item; an unreachable store reads as empty.
	pub async fn pop(&self) -> Result<Option<T>, StoreError> {
		pop_scored(&self.store, &self.key).await
	}

	/// Number of queued items.
	pub async fn len(&self) -> Result<u64, StoreError> {
		self.store.scored_len(&self.key).await
	}

	/// Returns `true` when nothing is queued.
	pub async fn is_empty(&self) -> Result<bool, StoreError> {
		Ok(self.len().await? == 0)
	}
}
impl<T> Clone for PriorityQueue<T> {
	fn clone(&self) -> Self {
		Self { store: self.store.clone(), key: self.key.clone(), item: PhantomData }
	}
}
impl<T> Debug for PriorityQueue<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PriorityQueue").field("key", &self.key).finish()
	}
}

async fn push_listed<T>(store: &KvStore, key: &str, item: &T) -> Result<u64>
where
	T: ?Sized + Serialize,
{
	let raw = serde_json::to_string(item)?;
	let len = OpSpan::new(OpKind::Queue, "push")
		.instrument(store.push_back(key, raw))
		.await
		.inspect_err(|_| obs::record_op_outcome(OpKind::Queue, OpOutcome::Failure))?;

	obs::record_op_outcome(OpKind::Queue, OpOutcome::Success);

	Ok(len)
}

async fn push_scored<T>(store: &KvStore, key: &str, item: &T, priority: f64) -> Result<()>
where
	T: ?Sized + Serialize,
{
	let raw = serde_json::to_string(item)?;

	OpSpan::new(OpKind::Queue, "push")
		.instrument(store.add_scored(key, &raw, priority))
		.await
		.inspect_err(|_| obs::record_op_outcome(OpKind::Queue, OpOutcome::Failure))?;
	obs::record_op_outcome(OpKind::Queue, OpOutcome::Success);

	Ok(())
}

async fn pop_listed<T>(store: &KvStore, key: &str) -> Result<Option<T>, StoreError>
where
	T: DeserializeOwned,
{
	let popped = OpSpan::new(OpKind::Queue, "pop").instrument(store.pop_front(key)).await;

	decode_popped(key, empty_when_unavailable(popped)?)
}

async fn pop_scored<T>(store: &KvStore, key: &str) -> Result<Option<T>, StoreError>
where
	T: DeserializeOwned,
{
	let popped = OpSpan::new(OpKind::Queue, "pop").instrument(store.pop_highest_score(key)).await;
	let raw = empty_when_unavailable(popped)?.map(|(member, _score)| member);

	decode_popped(key, raw)
}

fn empty_when_unavailable<T>(
	popped: Result<Option<T>, StoreError>,
) -> Result<Option<T>, StoreError> {
	match popped {
		Err(StoreError::Unavailable { .. }) => {
			obs::record_op_outcome(OpKind::Queue, OpOutcome::Degraded);

			Ok(None)
		},
		other => other,
	}
}

fn decode_popped<T>(key: &str, raw: Option<String>) -> Result<Option<T>, StoreError>
where
	T: DeserializeOwned,
{
	raw.map(|raw| store::decode_json(key, &raw)).transpose()
}
