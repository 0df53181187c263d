
    use super::*;
    use crate::events::QueueEvents;
    use crate::message::{MessageState, PushOptions};
    use crate::mutex::QueueMutex;
    use crate::test_support::*;
    use dbqueue_config::QueueConfig;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn worker(h: &Harness) -> Worker {
        Worker::new(h.queue.clone(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_run_processes_in_priority_order() {
        let mut events = QueueEvents::new();
        let executed = record_executions(&mut events);
        let h = harness_with(QueueConfig::default(), events);

        let low = h
            .queue
            .push_with(&noop("low"), PushOptions::new().with_priority(10))
            .await
            .unwrap();
        let first_high = h
            .queue
            .push_with(&noop("high-1"), PushOptions::new().with_priority(1))
            .await
            .unwrap();
        let second_high = h
            .queue
            .push_with(&noop("high-2"), PushOptions::new().with_priority(1))
            .await
            .unwrap();

        let summary = worker(&h).run().await.unwrap();
        assert_eq!(
            summary,
            RunSummary {
                processed: 3,
                released: 3,
                retried: 0,
            }
        );

        let expected: Vec<_> = [first_high, second_high, low].into_iter().flatten().collect();
        assert_eq!(*executed.lock(), expected);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_on_empty_queue() {
        let h = harness();
        let w = worker(&h);
        assert_eq!(w.run().await.unwrap(), RunSummary::default());
        assert!(!w.is_running());
    }

    #[tokio::test]
    async fn test_worker_events_wrap_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut events = QueueEvents::new();
        {
            let log = log.clone();
            events.on_worker_start(move |e| log.lock().push(format!("start:{}", e.channel)));
        }
        {
            let log = log.clone();
            events.on_after_exec(move |_| log.lock().push("exec".to_string()));
        }
        {
            let log = log.clone();
            events.on_worker_stop(move |e| log.lock().push(format!("stop:{}", e.channel)));
        }
        let h = harness_with(QueueConfig::default(), events);
        h.queue.push(&noop("a")).await.unwrap();

        worker(&h).run().await.unwrap();
        assert_eq!(*log.lock(), vec!["start:queue", "exec", "stop:queue"]);
    }

    #[tokio::test]
    async fn test_retry_after_ttr() {
        let h = harness_with(
            QueueConfig {
                max_attempts: 2,
                ..Default::default()
            },
            QueueEvents::new(),
        );
        let id = h
            .queue
            .push_with(
                &Fail {
                    reason: "flaky".to_string(),
                },
                PushOptions::new().with_ttr(2),
            )
            .await
            .unwrap()
            .unwrap();
        let w = worker(&h);

        let summary = w.run().await.unwrap();
        assert_eq!(summary.retried, 1);
        assert_eq!(h.queue.status(id).await.unwrap(), MessageState::Reserved);

        h.clock.advance(3);
        let summary = w.run().await.unwrap();
        assert_eq!(summary.released, 1);
        assert_eq!(h.queue.status(id).await.unwrap(), MessageState::Done);
    }

    #[tokio::test]
    async fn test_retryable_job_is_reclaimed_until_it_gives_up() {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let mut events = QueueEvents::new();
        {
            let attempts = attempts.clone();
            events.on_after_error(move |e| attempts.lock().push((e.attempt, e.retry)));
        }
        let h = harness_with(QueueConfig::default(), events);
        let id = h
            .queue
            .push(&Flaky { attempts: 3, ttr: 5 })
            .await
            .unwrap()
            .unwrap();
        let w = worker(&h);

        for _ in 0..3 {
            w.run().await.unwrap();
            h.clock.advance(6);
        }

        assert_eq!(*attempts.lock(), vec![(1, true), (2, true), (3, false)]);
        assert_eq!(h.queue.status(id).await.unwrap(), MessageState::Done);
        assert_eq!(w.run().await.unwrap().processed, 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_after_current_message() {
        let token = CancellationToken::new();
        let mut events = QueueEvents::new();
        {
            let token = token.clone();
            events.on_after_exec(move |_| token.cancel());
        }
        let h = harness_with(QueueConfig::default(), events);
        for tag in ["a", "b", "c"] {
            h.queue.push(&noop(tag)).await.unwrap();
        }

        let w = Worker::new(h.queue.clone(), token);
        assert_eq!(w.run().await.unwrap().processed, 1);
        assert_eq!(h.queue.stats().await.unwrap().waiting, 2);
    }

    #[tokio::test]
    async fn test_listen_with_zero_delay_returns_when_empty() {
        let h = harness();
        h.queue.push(&noop("a")).await.unwrap();
        h.queue.push(&noop("b")).await.unwrap();

        let summary = worker(&h).listen(Duration::ZERO).await.unwrap();
        assert_eq!(summary.processed, 2);
    }

    #[tokio::test]
    async fn test_listen_survives_lock_timeout() {
        let h = harness_with(
            QueueConfig {
                mutex_timeout_secs: 0,
                ..Default::default()
            },
            QueueEvents::new(),
        );
        h.queue.push(&noop("a")).await.unwrap();
        assert!(h.mutex.acquire("dbqueue:queue", Duration::ZERO).await.unwrap());

        let summary = worker(&h).listen(Duration::ZERO).await.unwrap();
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_picks_up_new_work_until_cancelled() {
        let passes = Arc::new(AtomicUsize::new(0));
        let mut events = QueueEvents::new();
        {
            let passes = passes.clone();
            events.on_after_exec(move |_| {
                passes.fetch_add(1, Ordering::SeqCst);
            });
        }
        let h = harness_with(QueueConfig::default(), events);
        let token = CancellationToken::new();
        let w = Arc::new(Worker::new(h.queue.clone(), token.clone()));

        let handle = {
            let w = w.clone();
            tokio::spawn(async move { w.listen(Duration::from_secs(3)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(w.is_running());
        h.queue.push(&noop("late")).await.unwrap();

        // The next pass starts after the 3s listen delay.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(passes.load(Ordering::SeqCst), 1);

        token.cancel();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.processed, 1);
        assert!(!w.is_running());
    }
