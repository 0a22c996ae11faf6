    use super::*;
    use crate::error::Result;
    use crate::log::{EntryId, MemoryLog, ReadBatch, NOTIFICATIONS_FEED};
    use crate::workflow::MockWorkflowEngine;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::time::timeout;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fast_config() -> SubscriptionConfig {
        SubscriptionConfig {
            poll_timeout: Duration::from_millis(50),
            cycle_delay: Duration::from_millis(5),
            ..SubscriptionConfig::default()
        }
    }

    struct Harness {
        id: SubscriptionId,
        registry: Arc<RelayRegistry>,
        events: mpsc::Receiver<OutboundEvent>,
        subscription: Subscription,
    }

    fn harness(target: StreamTarget, log: Arc<dyn LogSource>) -> Harness {
        harness_with(target, log, fast_config(), 16)
    }

    fn harness_with(
        target: StreamTarget,
        log: Arc<dyn LogSource>,
        config: SubscriptionConfig,
        buffer: usize,
    ) -> Harness {
        let registry = Arc::new(RelayRegistry::new());
        let id = SubscriptionId::new();
        let channels = target.channels();
        let token = registry.register(id, target.clone(), channels.clone());
        let (tx, rx) = mpsc::channel(buffer);
        let subscription = Subscription::new(
            id,
            target,
            CursorTracker::new(&channels),
            config,
            log,
            registry.clone(),
            token,
            tx,
        );
        Harness {
            id,
            registry,
            events: rx,
            subscription,
        }
    }

    async fn next(events: &mut mpsc::Receiver<OutboundEvent>) -> OutboundEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    /// Log source whose reads always fail.
    struct BrokenLog;

    #[async_trait]
    impl LogSource for BrokenLog {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn append(&self, _: &ChannelKey, _: &Fields, _: Option<usize>) -> Result<EntryId> {
            Err(Error::BackendUnavailable("down".to_string()))
        }

        async fn read(&self, _: &[(ChannelKey, EntryId)], _: usize, _: Duration) -> Result<ReadBatch> {
            Err(Error::BackendUnavailable("down".to_string()))
        }

        async fn ping(&self) -> Result<()> {
            Err(Error::BackendUnavailable("down".to_string()))
        }
    }

    /// Log source that returns the same entry on every read.
    struct RepeatingLog(LogEntry);

    #[async_trait]
    impl LogSource for RepeatingLog {
        fn name(&self) -> &'static str {
            "repeating"
        }

        async fn append(&self, _: &ChannelKey, _: &Fields, _: Option<usize>) -> Result<EntryId> {
            Ok(self.0.id)
        }

        async fn read(&self, _: &[(ChannelKey, EntryId)], _: usize, _: Duration) -> Result<ReadBatch> {
            let mut batch = ReadBatch::new();
            batch.insert(self.0.channel.clone(), vec![self.0.clone()]);
            Ok(batch)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_stream_target_shapes() {
        let workflow = StreamTarget::Workflow("wf-1".to_string());
        assert_eq!(workflow.channels(), vec![ChannelKey::workflow("wf-1")]);
        assert_eq!(workflow.id_field(), "workflow_id");
        assert_eq!(workflow.default_event_type(), "progress");
        assert_eq!(workflow.workflow_id(), Some("wf-1"));
        assert_eq!(workflow.filter(), EventFilter::All);

        let file = StreamTarget::File("abc".to_string());
        assert_eq!(file.channels(), vec![ChannelKey::file("abc")]);
        assert_eq!(file.default_event_type(), "analysis");
        assert_eq!(file.workflow_id(), None);

        let user = StreamTarget::User("u1".to_string());
        assert_eq!(user.channels().len(), 4);
        assert!(user.is_merged());
        assert_eq!(user.filter(), EventFilter::Subscriber("u1".to_string()));
        assert_eq!(user.to_string(), "user:u1");
    }

    #[test]
    fn test_subscriber_filter() {
        let filter = EventFilter::Subscriber("u1".to_string());

        assert!(filter.matches(&fields(&[("user_id", "u1")])));
        assert!(filter.matches(&fields(&[("workflow_id", "user:u1:analyze-9")])));
        assert!(filter.matches(&fields(&[("file_id", "user:u1:doc")])));

        assert!(!filter.matches(&fields(&[("user_id", "u2")])));
        assert!(!filter.matches(&fields(&[("workflow_id", "user:u10:analyze-9")])));
        assert!(!filter.matches(&fields(&[("progress", "40")])));

        assert!(EventFilter::All.matches(&Fields::new()));
    }

    #[tokio::test]
    async fn test_lifecycle_connected_entries_disconnected() {
        let log = Arc::new(MemoryLog::new());
        let channel = ChannelKey::file("abc");
        log.append(&channel, &fields(&[("event_type", "uploaded"), ("progress", "25")]), None)
            .await
            .unwrap();
        log.append(&channel, &fields(&[("progress", "50")]), None)
            .await
            .unwrap();

        let Harness {
            id,
            registry,
            mut events,
            subscription,
        } = harness(StreamTarget::File("abc".to_string()), log);
        let task = tokio::spawn(subscription.run());

        let connected = next(&mut events).await;
        assert_eq!(connected.wire.event, "connected");

        let first = next(&mut events).await;
        assert_eq!(first.wire.event, "uploaded");
        let payload: serde_json::Value = serde_json::from_str(&first.wire.data).unwrap();
        assert_eq!(payload, json!({"event_type": "uploaded", "progress": "25"}));

        let second = next(&mut events).await;
        assert_eq!(second.wire.event, "analysis");

        assert!(registry.stop(&id));
        let last = next(&mut events).await;
        assert!(last.event.is_terminal());

        assert_eq!(task.await.unwrap(), SubscriptionState::Closed);
        assert!(!registry.contains(&id));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_emits_one_error_then_disconnected() {
        let Harness {
            id,
            registry,
            mut events,
            subscription,
        } = harness(StreamTarget::Workflow("wf".to_string()), Arc::new(BrokenLog));
        let task = tokio::spawn(subscription.run());

        assert_eq!(next(&mut events).await.wire.event, "connected");
        let error = next(&mut events).await;
        assert_eq!(error.wire.event, "error");
        assert!(error.wire.data.contains("Event log connection lost"));
        assert!(next(&mut events).await.event.is_terminal());
        assert!(events.recv().await.is_none());

        task.await.unwrap();
        assert_eq!(registry.count(), 0);
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn test_repeated_entry_is_an_invariant_violation() {
        let entry = LogEntry {
            id: EntryId::new(5, 0),
            channel: ChannelKey::file("abc"),
            fields: fields(&[("event_type", "uploaded")]),
        };
        let Harness {
            mut events,
            subscription,
            ..
        } = harness(StreamTarget::File("abc".to_string()), Arc::new(RepeatingLog(entry)));
        let task = tokio::spawn(subscription.run());

        assert_eq!(next(&mut events).await.wire.event, "connected");
        assert_eq!(next(&mut events).await.wire.event, "uploaded");
        let error = next(&mut events).await;
        assert_eq!(error.wire.event, "error");
        assert!(error.wire.data.contains("invariant"));
        assert!(next(&mut events).await.event.is_terminal());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_receiver_stops_subscription() {
        let log = Arc::new(MemoryLog::new());
        let Harness {
            id,
            registry,
            events,
            subscription,
        } = harness(StreamTarget::File("abc".to_string()), log);
        drop(events);

        let state = timeout(Duration::from_secs(2), subscription.run())
            .await
            .unwrap();
        assert_eq!(state, SubscriptionState::Closed);
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn test_stop_with_stalled_client_still_unregisters() {
        let log = Arc::new(MemoryLog::new());
        let channel = ChannelKey::file("abc");
        for i in 0..20 {
            let n = i.to_string();
            log.append(&channel, &fields(&[("event_type", "uploaded"), ("n", &n)]), None)
                .await
                .unwrap();
        }

        let config = SubscriptionConfig {
            poll_timeout: Duration::from_millis(100),
            cycle_delay: Duration::from_millis(5),
            event_buffer: 4,
            ..SubscriptionConfig::default()
        };
        let Harness {
            id,
            registry,
            events,
            subscription,
        } = harness_with(StreamTarget::File("abc".to_string()), log, config, 4);
        let task = tokio::spawn(subscription.run());

        // Let the buffer fill while nobody reads.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_alive(&id));

        assert!(registry.stop(&id));
        let state = timeout(Duration::from_millis(400), task)
            .await
            .expect("subscription did not exit while the client was stalled")
            .unwrap();
        assert_eq!(state, SubscriptionState::Closed);
        assert_eq!(registry.count(), 0);
        drop(events);
    }

    #[tokio::test]
    async fn test_unformattable_entry_is_skipped_once() {
        let log = Arc::new(MemoryLog::new());
        let channel = ChannelKey::file("abc");
        log.append(&channel, &fields(&[("event_type", "two\nlines")]), None)
            .await
            .unwrap();
        log.append(&channel, &fields(&[("event_type", "uploaded"), ("n", "1")]), None)
            .await
            .unwrap();

        let Harness {
            id,
            registry,
            mut events,
            subscription,
        } = harness(StreamTarget::File("abc".to_string()), log.clone());
        let task = tokio::spawn(subscription.run());

        assert_eq!(next(&mut events).await.wire.event, "connected");
        let first = next(&mut events).await;
        assert_eq!(first.wire.event, "uploaded");
        assert!(first.wire.data.contains("\"n\":\"1\""));

        // Several read cycles pass without the bad entry coming back.
        assert!(timeout(Duration::from_millis(150), events.recv()).await.is_err());
        assert!(registry.is_alive(&id));

        log.append(&channel, &fields(&[("event_type", "uploaded"), ("n", "2")]), None)
            .await
            .unwrap();
        let second = next(&mut events).await;
        assert_eq!(second.wire.event, "uploaded");
        assert!(second.wire.data.contains("\"n\":\"2\""));

        assert!(registry.stop(&id));
        assert_eq!(next(&mut events).await.wire.event, "disconnected");
        assert_eq!(task.await.unwrap(), SubscriptionState::Closed);
    }

    #[tokio::test]
    async fn test_merged_stream_filters_but_consumes() {
        let log = Arc::new(MemoryLog::new());
        let feed = ChannelKey::new(NOTIFICATIONS_FEED).unwrap();
        log.append(&feed, &fields(&[("user_id", "u1"), ("n", "1")]), None)
            .await
            .unwrap();
        log.append(&feed, &fields(&[("user_id", "u2"), ("n", "2")]), None)
            .await
            .unwrap();
        log.append(&feed, &fields(&[("user_id", "u1"), ("n", "3")]), None)
            .await
            .unwrap();

        let Harness {
            id,
            registry,
            mut events,
            subscription,
        } = harness(StreamTarget::User("u1".to_string()), log);
        let task = tokio::spawn(subscription.run());

        assert_eq!(next(&mut events).await.wire.event, "connected");
        let mut seen = Vec::new();
        for _ in 0..2 {
            let event = next(&mut events).await;
            assert_eq!(event.wire.event, "notification");
            let payload: serde_json::Value = serde_json::from_str(&event.wire.data).unwrap();
            seen.push(payload["n"].as_str().unwrap().to_string());
        }
        assert_eq!(seen, vec!["1", "3"]);

        // Several more cycles pass without the suppressed entry showing up.
        tokio::time::sleep(Duration::from_millis(150)).await;
        registry.stop(&id);
        assert!(next(&mut events).await.event.is_terminal());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_poller_injects_status_and_tolerates_failures() {
        let log = Arc::new(MemoryLog::new());
        let mut engine = MockWorkflowEngine::new();
        let mut calls = 0;
        engine.expect_query().returning(move |id, query| {
            calls += 1;
            match calls {
                1 => Err(Error::QueryUnsupported {
                    workflow_id: id.to_string(),
                    query: query.to_string(),
                }),
                2 => Err(Error::NotFound(id.to_string())),
                _ => Ok(json!({"step": "parse", "progress": 40})),
            }
        });
        let poller = StatusPoller::new(Arc::new(engine), "getAnalysisStatus", Duration::from_millis(10));

        let Harness {
            id,
            registry,
            mut events,
            subscription,
        } = harness(StreamTarget::Workflow("wf".to_string()), log.clone());
        let task = tokio::spawn(subscription.with_status_poller(poller).run());

        assert_eq!(next(&mut events).await.wire.event, "connected");
        let status = next(&mut events).await;
        assert_eq!(status.wire.event, "temporal_status");
        let payload: serde_json::Value = serde_json::from_str(&status.wire.data).unwrap();
        assert_eq!(payload["workflow_id"], "wf");
        assert_eq!(payload["status"]["progress"], 40);

        // The stream keeps delivering log entries after the failed queries.
        log.append(&ChannelKey::workflow("wf"), &fields(&[("step", "done")]), None)
            .await
            .unwrap();
        let entry = loop {
            let event = next(&mut events).await;
            if event.wire.event != "temporal_status" {
                break event;
            }
        };
        assert_eq!(entry.wire.event, "progress");

        registry.stop(&id);
        let last = loop {
            let event = next(&mut events).await;
            if event.event.is_terminal() {
                break event;
            }
        };
        assert_eq!(last.wire.event, "disconnected");
        assert!(events.recv().await.is_none());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_poller_ignored_for_file_streams() {
        let engine = MockWorkflowEngine::new();
        let poller = StatusPoller::new(Arc::new(engine), "getAnalysisStatus", Duration::from_millis(10));
        let Harness { subscription, .. } =
            harness(StreamTarget::File("abc".to_string()), Arc::new(MemoryLog::new()));

        let subscription = subscription.with_status_poller(poller);
        assert!(subscription.poller.is_none());
        assert_eq!(subscription.state(), SubscriptionState::Connecting);
    }
