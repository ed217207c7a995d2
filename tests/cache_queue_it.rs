// crates.io
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Duration;
// self
use kv_gate::{
	KvConfig, KvStore, ModelId, Payload, PromptHash, QueueName, QueueShape, ResponseCache,
	WorkQueues,
};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Summarize {
	document: String,
}

fn model(id: &str) -> ModelId {
	ModelId::new(id).expect("Model fixture should be valid.")
}

fn completion(text: &str) -> Payload {
	let mut payload = Payload::new();

	payload.insert("completion".into(), json!(text));

	payload
}

#[tokio::test]
async fn repeated_puts_are_idempotent() {
	let (store, _backend) = KvStore::in_memory();
	let cache = ResponseCache::new(store);
	let hash = PromptHash::of("summarize: hello");

	for _ in 0..2 {
		cache
			.put(&model("claude"), &hash, &completion("hi"), None)
			.await
			.expect("Put should succeed.");
	}

	let hit = cache.get(&model("claude"), &hash).await.expect("Entry should be cached.");

	assert_eq!(hit.model, model("claude"));
	assert_eq!(hit.payload, completion("hi"));
}

#[tokio::test]
async fn models_do_not_share_entries() {
	let (store, _backend) = KvStore::in_memory();
	let cache = ResponseCache::new(store);
	let hash = PromptHash::of("same prompt");

	cache.put(&model("m1"), &hash, &completion("one"), None).await.expect("Put works.");
	cache.put(&model("m2"), &hash, &completion("two"), None).await.expect("Put works.");

	let first = cache.get(&model("m1"), &hash).await.expect("m1 entry should be cached.");
	let second = cache.get(&model("m2"), &hash).await.expect("m2 entry should be cached.");

	assert_eq!(first.payload["completion"], "one");
	assert_eq!(second.payload["completion"], "two");
	assert!(cache.get(&model("m3"), &hash).await.is_none());
}

#[tokio::test]
async fn configured_ttl_evicts_entries() {
	let (store, backend) = KvStore::in_memory();
	let config = KvConfig::default().with_cache_ttl(Duration::seconds(120));
	let cache = ResponseCache::from_config(store, &config);
	let hash = PromptHash::of("p");

	cache.put(&model("m1"), &hash, &completion("x"), None).await.expect("Put works.");
	backend.advance(Duration::seconds(119));

	assert!(cache.get(&model("m1"), &hash).await.is_some());

	backend.advance(Duration::seconds(2));

	assert!(cache.get(&model("m1"), &hash).await.is_none());
	assert_eq!((cache.stats().hits(), cache.stats().misses()), (1, 1));
}

#[tokio::test]
async fn cache_outage_reads_as_miss() {
	let (store, backend) = KvStore::in_memory();
	let cache = ResponseCache::new(store);
	let hash = PromptHash::of("p");

	cache.put(&model("m1"), &hash, &completion("x"), None).await.expect("Put works.");
	backend.set_offline(true);

	assert!(cache.get(&model("m1"), &hash).await.is_none());
	assert!(cache.increment_usage(&model("m1")).await.is_err());
}

#[tokio::test]
async fn priority_queue_serves_highest_first() {
	let (store, _backend) = KvStore::in_memory();
	let queues = WorkQueues::new(store);
	let name = QueueName::new("ai-jobs").expect("Queue fixture should be valid.");

	for priority in [1.0, 5.0, 3.0] {
		queues.push(&name, &json!({ "p": priority }), priority).await.expect("Push works.");
	}

	let mut order = Vec::new();

	while let Some(item) = queues.pop(&name, QueueShape::Priority).await.expect("Pop works.") {
		order.push(item["p"].as_f64().expect("Priority field should be numeric."));
	}

	assert_eq!(order, vec![5.0, 3.0, 1.0]);
}

#[tokio::test]
async fn typed_fifo_queue_hands_off_in_order() {
	let (store, _backend) = KvStore::in_memory();
	let name = QueueName::new("summaries").expect("Queue fixture should be valid.");
	let producer = WorkQueues::new(store.clone()).fifo::<Summarize>(&name);
	let consumer = WorkQueues::new(store).fifo::<Summarize>(&name);

	for document in ["A", "B", "C"] {
		producer.push(&Summarize { document: document.into() }).await.expect("Push works.");
	}

	let mut seen = Vec::new();

	while let Some(job) = consumer.pop().await.expect("Pop works.") {
		seen.push(job.document);
	}

	assert_eq!(seen, ["A", "B", "C"]);
}

#[tokio::test]
async fn queue_outage_fails_push_and_empties_pop() {
	let (store, backend) = KvStore::in_memory();
	let name = QueueName::new("jobs").expect("Queue fixture should be valid.");
	let priority = WorkQueues::new(store).priority::<Summarize>(&name);

	priority.push(&Summarize { document: "kept".into() }, 2.0).await.expect("Push works.");
	backend.set_offline(true);

	assert!(priority.push(&Summarize { document: "lost".into() }, 1.0).await.is_err());
	assert_eq!(priority.pop().await.expect("Pop reads as empty."), None);

	backend.set_offline(false);

	assert_eq!(
		priority.pop().await.expect("Pop should succeed."),
		Some(Summarize { document: "kept".into() })
	);
}
