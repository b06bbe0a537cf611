//! Exercises the Redis backend against a live broker.
//!
//! Run with `REDIS_URL=redis://localhost:6379/0 cargo test -- --ignored`.
//! Each test works under its own key prefix and removes it afterwards.

use std::time::Duration;

use marquee_core::error::LabelError;
use marquee_core::orchestration::{
    DequeueRequest, LabelTask, QueueKeys, QueueService, RedisQueue,
    RedisQueueConfig, TaskLease,
};
use marquee_core::types::{MovieEvent, RatingKey};
use uuid::Uuid;

struct Broker {
    queue: RedisQueue,
    url: String,
    keys: QueueKeys,
}

impl Broker {
    async fn connect(dead_letter_cap: usize) -> Option<Self> {
        let Ok(url) = std::env::var("REDIS_URL") else {
            eprintln!("skipping: REDIS_URL not set");
            return None;
        };
        let prefix = format!("marquee-test-{}", Uuid::now_v7());
        let config = RedisQueueConfig {
            url: url.clone(),
            prefix: prefix.clone(),
            dead_letter_cap,
        };
        let queue = RedisQueue::connect(&config).await.unwrap();
        Some(Self {
            queue,
            url,
            keys: QueueKeys::new(&prefix),
        })
    }

    async fn claim(&self, ttl: chrono::Duration) -> Option<TaskLease> {
        self.queue
            .dequeue(DequeueRequest {
                worker_id: "test-w0".into(),
                lease_ttl: ttl,
            })
            .await
            .unwrap()
    }

    async fn cleanup(self) {
        let client = redis::Client::open(self.url.as_str()).unwrap();
        let mut conn = client.get_multiplexed_async_connection().await.unwrap();
        redis::cmd("DEL")
            .arg(&self.keys.ready)
            .arg(&self.keys.delayed)
            .arg(&self.keys.leased)
            .arg(&self.keys.payloads)
            .arg(&self.keys.dead)
            .query_async::<i64>(&mut conn)
            .await
            .unwrap();
    }
}

fn task(key: &str) -> LabelTask {
    LabelTask::from_event(&MovieEvent::new_movie(
        RatingKey::parse(key).unwrap(),
        None,
    ))
}

fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

#[tokio::test]
#[ignore = "requires a Redis server (REDIS_URL)"]
async fn dequeues_in_fifo_order() {
    let Some(broker) = Broker::connect(10).await else {
        return;
    };
    broker.queue.enqueue(task("1")).await.unwrap();
    broker.queue.enqueue(task("2")).await.unwrap();

    let first = broker.claim(secs(30)).await.unwrap();
    assert_eq!(first.task.rating_key.as_str(), "1");
    assert_eq!(broker.queue.depth().await.unwrap().leased, 1);

    broker.queue.complete(&first).await.unwrap();
    let depth = broker.queue.depth().await.unwrap();
    assert_eq!((depth.ready, depth.leased), (1, 0));

    let second = broker.claim(secs(30)).await.unwrap();
    assert_eq!(second.task.rating_key.as_str(), "2");
    broker.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Redis server (REDIS_URL)"]
async fn retry_increments_attempt_and_respects_delay() {
    let Some(broker) = Broker::connect(10).await else {
        return;
    };
    broker.queue.enqueue(task("7")).await.unwrap();
    let lease = broker.claim(secs(30)).await.unwrap();

    broker
        .queue
        .retry(&lease, Duration::from_secs(3_600))
        .await
        .unwrap();
    assert!(broker.claim(secs(30)).await.is_none());
    assert_eq!(broker.queue.depth().await.unwrap().delayed, 1);

    broker.queue.enqueue(task("8")).await.unwrap();
    let other = broker.claim(secs(30)).await.unwrap();
    broker.queue.retry(&other, Duration::ZERO).await.unwrap();
    let retried = broker.claim(secs(30)).await.unwrap();
    assert_eq!(retried.task.attempt_count, 1);
    assert_eq!(retried.task.id, other.task.id);
    broker.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Redis server (REDIS_URL)"]
async fn expired_lease_is_reclaimed_and_stale_holder_is_ignored() {
    let Some(broker) = Broker::connect(10).await else {
        return;
    };
    broker.queue.enqueue(task("3")).await.unwrap();
    let stale = broker.claim(chrono::Duration::milliseconds(-1)).await.unwrap();

    assert_eq!(broker.queue.scan_expired_leases().await.unwrap(), 1);
    let current = broker.claim(secs(30)).await.unwrap();
    assert_eq!(current.task.id, stale.task.id);
    assert_ne!(current.lease_id, stale.lease_id);

    let mut stale_copy = stale.clone();
    assert!(
        !broker
            .queue
            .renew(&mut stale_copy, secs(30))
            .await
            .unwrap()
    );

    broker.queue.retry(&stale, Duration::ZERO).await.unwrap();
    broker.queue.complete(&stale).await.unwrap();
    let depth = broker.queue.depth().await.unwrap();
    assert_eq!((depth.ready, depth.delayed, depth.leased), (0, 0, 1));

    let mut current = current;
    assert!(broker.queue.renew(&mut current, secs(30)).await.unwrap());
    broker.queue.complete(&current).await.unwrap();
    assert_eq!(broker.queue.depth().await.unwrap().pending(), 0);
    broker.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Redis server (REDIS_URL)"]
async fn dead_letters_are_newest_first_and_capped() {
    let Some(broker) = Broker::connect(2).await else {
        return;
    };
    for key in ["1", "2", "3"] {
        broker.queue.enqueue(task(key)).await.unwrap();
        let lease = broker.claim(secs(30)).await.unwrap();
        let error = LabelError::invalid_response(
            "unexpected keyword payload",
            Some("<html>CAPTCHA-PAGE</html>"),
        );
        broker.queue.dead_letter(&lease, &error).await.unwrap();
    }

    let dead = broker.queue.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 2);
    assert_eq!(dead[0].task.rating_key.as_str(), "3");
    assert_eq!(dead[1].task.rating_key.as_str(), "2");
    assert_eq!(dead[0].kind, "invalid_response");
    assert_eq!(
        dead[0].raw_payload.as_deref(),
        Some("<html>CAPTCHA-PAGE</html>")
    );
    assert_eq!(broker.queue.depth().await.unwrap().leased, 0);
    broker.cleanup().await;
}
