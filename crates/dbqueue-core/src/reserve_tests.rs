
    use super::*;
    use crate::events::QueueEvents;
    use crate::clock::ManualClock;
    use crate::message::{Message, MessageId, NewMessage, PushOptions, QueueStats};
    use crate::mutex::{MemoryMutex, QueueMutex};
    use crate::store::{MemoryMessageStore, MessageStore};
    use crate::test_support::*;
    use async_trait::async_trait;
    use dbqueue_config::QueueConfig;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::panic::AssertUnwindSafe;
    use std::sync::Arc;

    async fn push(h: &Harness, tag: &str, options: PushOptions) -> MessageId {
        h.queue.push_with(&noop(tag), options).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let h = harness();
        let low = push(&h, "low", PushOptions::new().with_priority(10)).await;
        let first_high = push(&h, "high-1", PushOptions::new().with_priority(1)).await;
        let second_high = push(&h, "high-2", PushOptions::new().with_priority(1)).await;

        let order: Vec<MessageId> = [
            h.queue.reserve().await.unwrap().unwrap().id,
            h.queue.reserve().await.unwrap().unwrap().id,
            h.queue.reserve().await.unwrap().unwrap().id,
        ]
        .to_vec();
        assert_eq!(order, vec![first_high, second_high, low]);
        assert!(h.queue.reserve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reserve_records_attempt() {
        let h = harness();
        let id = push(&h, "a", PushOptions::new()).await;

        let reserved = h.queue.reserve().await.unwrap().unwrap();
        assert_eq!(reserved.attempt, 1);
        assert_eq!(reserved.ttr, 300);

        let row = h.store.get(id).await.unwrap().unwrap();
        assert_eq!(row.reserved_at, Some(START));
        assert_eq!(row.attempt, 1);
    }

    #[tokio::test]
    async fn test_delay_is_respected() {
        let h = harness();
        let id = push(&h, "later", PushOptions::new().with_delay(5)).await;

        h.clock.advance(4);
        assert!(h.queue.reserve().await.unwrap().is_none());

        h.clock.advance(1);
        assert_eq!(h.queue.reserve().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_expired_reservation_is_reclaimed() {
        let h = harness();
        let id = push(&h, "slow", PushOptions::new().with_ttr(2)).await;
        assert_eq!(h.queue.reserve().await.unwrap().unwrap().id, id);

        // Not expired while reserved_at >= now - ttr.
        h.clock.advance(2);
        assert!(h.queue.reserve().await.unwrap().is_none());

        h.clock.advance(1);
        let again = h.queue.reserve().await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempt, 2);
    }

    #[tokio::test]
    async fn test_reclaim_runs_once_per_second() {
        let h = harness();
        let id = push(&h, "a", PushOptions::new().with_ttr(10)).await;
        assert!(h.queue.reserve().await.unwrap().is_some());

        // Backdate the reservation behind the queue's back.
        h.store.update_reservation(id, START - 100, 1).await.unwrap();
        assert!(h.queue.reserve().await.unwrap().is_none());

        h.clock.advance(1);
        let again = h.queue.reserve().await.unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempt, 2);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let h = harness();
        let mail = h.queue.for_channel("mail");
        let id = mail.push(&noop("m")).await.unwrap().unwrap();

        assert!(h.queue.reserve().await.unwrap().is_none());
        assert_eq!(mail.reserve().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_lock_released_after_reserve() {
        let h = harness();
        push(&h, "a", PushOptions::new()).await;

        h.queue.reserve().await.unwrap();
        assert!(!h.mutex.is_held("dbqueue:queue"));

        h.queue.reserve().await.unwrap();
        assert!(!h.mutex.is_held("dbqueue:queue"));
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let config = QueueConfig {
            mutex_timeout_secs: 0,
            ..Default::default()
        };
        let h = harness_with(config, QueueEvents::new());
        let id = push(&h, "a", PushOptions::new()).await;

        assert!(h.mutex.acquire("dbqueue:queue", Duration::ZERO).await.unwrap());
        let result = h.queue.reserve().await;
        assert!(matches!(result, Err(QueueError::LockTimeout(key)) if key == "dbqueue:queue"));
        assert!(h.mutex.is_held("dbqueue:queue"));

        // Another channel uses another lock.
        assert!(h.queue.for_channel("mail").reserve().await.unwrap().is_none());

        h.mutex.release("dbqueue:queue").await.unwrap();
        assert_eq!(h.queue.reserve().await.unwrap().unwrap().id, id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservers_never_share_a_message() {
        let h = harness();
        for i in 0..50 {
            push(&h, &format!("job-{}", i), PushOptions::new()).await;
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue: Arc<Queue> = h.queue.clone();
            handles.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(message) = queue.reserve().await.unwrap() {
                    ids.push(message.id);
                }
                ids
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(seen.insert(id), "message {} reserved twice", id);
            }
        }
        assert_eq!(seen.len(), 50);
    }

    #[derive(Clone, Copy)]
    enum Fault {
        Error,
        Panic,
        Hang,
    }

    /// Memory store whose selection step can be made to fail.
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryMessageStore,
        fault: Mutex<Option<Fault>>,
    }

    impl FaultyStore {
        fn set_fault(&self, fault: Option<Fault>) {
            *self.fault.lock() = fault;
        }
    }

    #[async_trait]
    impl MessageStore for FaultyStore {
        async fn insert(&self, message: NewMessage) -> Result<MessageId, QueueError> {
            self.inner.insert(message).await
        }

        async fn get(&self, id: MessageId) -> Result<Option<Message>, QueueError> {
            self.inner.get(id).await
        }

        async fn update_reservation(
            &self,
            id: MessageId,
            reserved_at: i64,
            attempt: u32,
        ) -> Result<(), QueueError> {
            self.inner.update_reservation(id, reserved_at, attempt).await
        }

        async fn mark_done(&self, id: MessageId, done_at: i64) -> Result<(), QueueError> {
            self.inner.mark_done(id, done_at).await
        }

        async fn delete(&self, id: MessageId) -> Result<bool, QueueError> {
            self.inner.delete(id).await
        }

        async fn unreserve_expired(&self, now: i64) -> Result<u64, QueueError> {
            self.inner.unreserve_expired(now).await
        }

        async fn select_next_eligible(
            &self,
            channel: &str,
            now: i64,
        ) -> Result<Option<Message>, QueueError> {
            let fault = *self.fault.lock();
            match fault {
                Some(Fault::Error) => return Err(QueueError::Store("disk I/O error".to_string())),
                Some(Fault::Panic) => panic!("store crashed"),
                Some(Fault::Hang) => std::future::pending::<()>().await,
                None => {}
            }
            self.inner.select_next_eligible(channel, now).await
        }

        async fn last_issued_id(&self) -> Result<Option<MessageId>, QueueError> {
            self.inner.last_issued_id().await
        }

        async fn clear(&self, channel: &str) -> Result<u64, QueueError> {
            self.inner.clear(channel).await
        }

        async fn stats(&self, channel: &str, now: i64) -> Result<QueueStats, QueueError> {
            self.inner.stats(channel, now).await
        }
    }

    fn faulty_queue() -> (Queue, Arc<FaultyStore>, Arc<MemoryMutex>) {
        let store = Arc::new(FaultyStore::default());
        let mutex = Arc::new(MemoryMutex::new());
        let queue = Queue::builder(QueueConfig::default(), store.clone(), mutex.clone())
            .with_registry(registry())
            .with_clock(Arc::new(ManualClock::new(START)))
            .build();
        (queue, store, mutex)
    }

    /// Yield until a spawned release has run.
    async fn wait_released(mutex: &MemoryMutex, key: &str) {
        for _ in 0..100 {
            if !mutex.is_held(key) {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("lock '{}' still held", key);
    }

    #[tokio::test]
    async fn test_lock_released_on_store_error() {
        let (queue, store, mutex) = faulty_queue();
        let id = queue.push(&noop("a")).await.unwrap().unwrap();

        store.set_fault(Some(Fault::Error));
        assert!(matches!(queue.reserve().await, Err(QueueError::Store(_))));
        assert!(!mutex.is_held("dbqueue:queue"));

        store.set_fault(None);
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_lock_released_when_store_panics() {
        let (queue, store, mutex) = faulty_queue();
        let id = queue.push(&noop("a")).await.unwrap().unwrap();

        store.set_fault(Some(Fault::Panic));
        let unwound = AssertUnwindSafe(queue.reserve()).catch_unwind().await;
        assert!(unwound.is_err());
        wait_released(&mutex, "dbqueue:queue").await;

        store.set_fault(None);
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, id);
    }

    #[tokio::test]
    async fn test_lock_released_when_reserve_is_dropped() {
        let (queue, store, mutex) = faulty_queue();
        let id = queue.push(&noop("a")).await.unwrap().unwrap();

        store.set_fault(Some(Fault::Hang));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), queue.reserve()).await;
        assert!(timed_out.is_err());
        wait_released(&mutex, "dbqueue:queue").await;

        store.set_fault(None);
        assert_eq!(queue.reserve().await.unwrap().unwrap().id, id);
    }
