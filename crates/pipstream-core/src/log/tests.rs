    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_entry_id_ordering() {
        assert!(EntryId::BEGINNING < EntryId::new(0, 1));
        assert!(EntryId::new(5, 9) < EntryId::new(6, 0));
        assert!(EntryId::new(6, 0) < EntryId::new(6, 1));
        assert!(EntryId::BEGINNING.is_beginning());
    }

    #[test]
    fn test_entry_id_parse_and_display() {
        let id: EntryId = "1718000000000-3".parse().unwrap();
        assert_eq!(id, EntryId::new(1_718_000_000_000, 3));
        assert_eq!(id.to_string(), "1718000000000-3");

        let bare: EntryId = "0".parse().unwrap();
        assert!(bare.is_beginning());

        assert!("abc".parse::<EntryId>().is_err());
        assert!("1-x".parse::<EntryId>().is_err());
        assert!("".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_entry_id_serializes_as_string() {
        let json = serde_json::to_string(&EntryId::new(12, 4)).unwrap();
        assert_eq!(json, "\"12-4\"");
        let back: EntryId = serde_json::from_str("\"12-4\"").unwrap();
        assert_eq!(back, EntryId::new(12, 4));
    }

    #[test]
    fn test_channel_key_constructors() {
        assert_eq!(ChannelKey::workflow("wf-1").as_str(), "workflow:wf-1");
        assert_eq!(ChannelKey::file("abc").as_str(), "file:abc");
        assert!(ChannelKey::new("  ").is_err());
        assert_eq!(global_channels().len(), 4);
        assert!(global_channels()
            .iter()
            .any(|k| k.as_str() == NOTIFICATIONS_FEED));
    }

    #[tokio::test]
    async fn test_memory_append_assigns_increasing_ids() {
        let log = MemoryLog::new();
        let channel = ChannelKey::file("abc");

        let mut last = EntryId::BEGINNING;
        for i in 0..50 {
            let id = log
                .append(&channel, &fields(&[("n", &i.to_string())]), None)
                .await
                .unwrap();
            assert!(id > last, "id {} not greater than {}", id, last);
            last = id;
        }
        assert_eq!(log.len(&channel).await, 50);
    }

    #[tokio::test]
    async fn test_memory_rejects_empty_entry() {
        let log = MemoryLog::new();
        let result = log.append(&ChannelKey::file("abc"), &Fields::new(), None).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_read_after_cursor() {
        let log = MemoryLog::new();
        let channel = ChannelKey::workflow("wf");
        let first = log.append(&channel, &fields(&[("n", "1")]), None).await.unwrap();
        log.append(&channel, &fields(&[("n", "2")]), None).await.unwrap();
        log.append(&channel, &fields(&[("n", "3")]), None).await.unwrap();

        let batch = log
            .read(&[(channel.clone(), first)], 10, Duration::from_millis(10))
            .await
            .unwrap();
        let values: Vec<&str> = batch[&channel]
            .iter()
            .map(|e| e.fields["n"].as_str())
            .collect();
        assert_eq!(values, vec!["2", "3"]);
    }

    #[tokio::test]
    async fn test_memory_read_respects_limit() {
        let log = MemoryLog::new();
        let channel = ChannelKey::workflow("wf");
        for i in 0..5 {
            log.append(&channel, &fields(&[("n", &i.to_string())]), None)
                .await
                .unwrap();
        }
        let batch = log
            .read(&[(channel.clone(), EntryId::BEGINNING)], 2, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch[&channel].len(), 2);
        assert_eq!(batch[&channel][0].fields["n"], "0");
    }

    #[tokio::test]
    async fn test_memory_read_times_out_empty() {
        let log = MemoryLog::new();
        let start = Instant::now();
        let batch = log
            .read(
                &[(ChannelKey::file("none"), EntryId::BEGINNING)],
                10,
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_memory_read_wakes_on_append() {
        let log = Arc::new(MemoryLog::new());
        let channel = ChannelKey::file("wake");

        let writer = log.clone();
        let writer_channel = channel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            writer
                .append(&writer_channel, &fields(&[("event_type", "uploaded")]), None)
                .await
                .unwrap();
        });

        let start = Instant::now();
        let batch = log
            .read(&[(channel.clone(), EntryId::BEGINNING)], 10, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(batch[&channel].len(), 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_memory_trims_oldest_past_max_len() {
        let log = MemoryLog::new();
        let channel = ChannelKey::file("trim");
        for i in 0..10 {
            log.append(&channel, &fields(&[("n", &i.to_string())]), Some(3))
                .await
                .unwrap();
        }
        assert_eq!(log.len(&channel).await, 3);

        // A reader behind the trim point jumps to the oldest retained entry.
        let batch = log
            .read(&[(channel.clone(), EntryId::BEGINNING)], 10, Duration::from_millis(10))
            .await
            .unwrap();
        let values: Vec<&str> = batch[&channel]
            .iter()
            .map(|e| e.fields["n"].as_str())
            .collect();
        assert_eq!(values, vec!["7", "8", "9"]);
    }

    #[tokio::test]
    async fn test_memory_concurrent_readers_are_independent() {
        let log = MemoryLog::new();
        let channel = ChannelKey::workflow("shared");
        let a = log.append(&channel, &fields(&[("n", "a")]), None).await.unwrap();
        log.append(&channel, &fields(&[("n", "b")]), None).await.unwrap();

        let start_cursors = [(channel.clone(), EntryId::BEGINNING)];
        let a_cursors = [(channel.clone(), a)];
        let (from_start, from_a) = tokio::join!(
            log.read(&start_cursors, 10, Duration::from_millis(10)),
            log.read(&a_cursors, 10, Duration::from_millis(10)),
        );
        assert_eq!(from_start.unwrap()[&channel].len(), 2);
        assert_eq!(from_a.unwrap()[&channel].len(), 1);
    }

    #[tokio::test]
    async fn test_memory_read_multiple_channels() {
        let log = MemoryLog::new();
        let one = ChannelKey::workflow("one");
        let two = ChannelKey::file("two");
        log.append(&one, &fields(&[("n", "1")]), None).await.unwrap();
        log.append(&two, &fields(&[("n", "2")]), None).await.unwrap();

        let batch = log
            .read(
                &[(one.clone(), EntryId::BEGINNING), (two.clone(), EntryId::BEGINNING)],
                10,
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[&one][0].channel, one);
        assert_eq!(batch[&two][0].channel, two);
    }
