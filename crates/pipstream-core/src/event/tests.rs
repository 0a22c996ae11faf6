    use super::*;
    use crate::log::{ChannelKey, EntryId};

    fn entry(event_type: &str) -> LogEntry {
        let mut fields = Fields::new();
        fields.insert("event_type".to_string(), event_type.to_string());
        fields.insert("progress".to_string(), "25".to_string());
        LogEntry {
            id: EntryId::new(1, 0),
            channel: ChannelKey::file("abc"),
            fields,
        }
    }

    #[test]
    fn test_entry_frame() {
        let event = RelayEvent::now(EventKind::Entry {
            event_type: "uploaded".to_string(),
            entry: entry("uploaded"),
        });
        let wire = format_event(&event).unwrap();
        assert_eq!(wire.event, "uploaded");
        assert_eq!(wire.data, r#"{"event_type":"uploaded","progress":"25"}"#);
        assert_eq!(
            wire.to_frame(),
            "event: uploaded\ndata: {\"event_type\":\"uploaded\",\"progress\":\"25\"}\n\n"
        );
    }

    #[test]
    fn test_connected_payload_names_target() {
        let subscription_id = SubscriptionId::new();
        let event = RelayEvent::now(EventKind::Connected {
            subscription_id,
            target: StreamTarget::Workflow("wf-1".to_string()),
        });
        let wire = format_event(&event).unwrap();
        assert_eq!(wire.event, "connected");

        let payload: Value = serde_json::from_str(&wire.data).unwrap();
        assert_eq!(payload["workflow_id"], "wf-1");
        assert_eq!(payload["subscription_id"], subscription_id.to_string());
        assert!(payload["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_disconnected_is_terminal() {
        let event = RelayEvent::now(EventKind::Disconnected {
            subscription_id: SubscriptionId::new(),
            target: StreamTarget::User("u1".to_string()),
        });
        assert!(event.is_terminal());
        let payload: Value = serde_json::from_str(&format_event(&event).unwrap().data).unwrap();
        assert_eq!(payload["user_id"], "u1");
    }

    #[test]
    fn test_status_and_error_payloads() {
        let status = RelayEvent::now(EventKind::WorkflowStatus {
            workflow_id: "wf-1".to_string(),
            status: json!({"step": "parse"}),
        });
        let wire = format_event(&status).unwrap();
        assert_eq!(wire.event, "temporal_status");
        let payload: Value = serde_json::from_str(&wire.data).unwrap();
        assert_eq!(payload["status"]["step"], "parse");

        let error = RelayEvent::now(EventKind::Error {
            message: "Event log connection lost".to_string(),
        });
        let wire = format_event(&error).unwrap();
        assert_eq!(wire.event, "error");
        assert!(!error.is_terminal());
    }

    #[test]
    fn test_unframeable_event_type_is_rejected() {
        for bad in ["", "two\nlines", "cr\r"] {
            let event = RelayEvent::now(EventKind::Entry {
                event_type: bad.to_string(),
                entry: entry(bad),
            });
            assert!(matches!(format_event(&event), Err(Error::Format(_))));
            assert!(OutboundEvent::encode(event).is_err());
        }
    }

    #[test]
    fn test_payload_stays_on_one_line() {
        let mut entry = entry("uploaded");
        entry
            .fields
            .insert("message".to_string(), "line one\nline two".to_string());
        let event = RelayEvent::now(EventKind::Entry {
            event_type: "uploaded".to_string(),
            entry,
        });
        let wire = format_event(&event).unwrap();
        assert!(!wire.data.contains('\n'));
        assert_eq!(wire.to_frame().matches("\n\n").count(), 1);
    }

    #[test]
    fn test_relay_event_serializes_flat() {
        let event = RelayEvent::now(EventKind::Error {
            message: "boom".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "error");
        assert_eq!(value["message"], "boom");
        assert!(value.get("timestamp").is_some());
    }
