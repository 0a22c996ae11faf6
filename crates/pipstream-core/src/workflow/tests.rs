    use super::*;
    use mockall::predicate::eq;
    use serde_json::json;

    fn poller(engine: MockWorkflowEngine) -> StatusPoller {
        StatusPoller::new(Arc::new(engine), DEFAULT_STATUS_QUERY, Duration::from_millis(10))
    }

    #[test]
    fn test_workflow_status_from_engine_names() {
        assert_eq!(
            WorkflowStatus::from_engine("WORKFLOW_EXECUTION_STATUS_RUNNING"),
            WorkflowStatus::Running
        );
        assert_eq!(WorkflowStatus::from_engine("COMPLETED"), WorkflowStatus::Completed);
        assert_eq!(WorkflowStatus::from_engine("CANCELLED"), WorkflowStatus::Canceled);
        assert_eq!(WorkflowStatus::from_engine("SOMETHING_NEW"), WorkflowStatus::Unknown);
        assert!(WorkflowStatus::Completed.is_closed());
        assert!(!WorkflowStatus::Running.is_closed());
        assert_eq!(WorkflowStatus::TimedOut.to_string(), "TIMED_OUT");
    }

    #[tokio::test]
    async fn test_query_returns_status() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_query()
            .with(eq("analyze-1"), eq(DEFAULT_STATUS_QUERY))
            .times(1)
            .returning(|_, _| Ok(json!({"step": "parse", "progress": 40})));

        let outcome = poller(engine).query("analyze-1").await.unwrap();
        assert_eq!(
            outcome,
            QueryOutcome::Status(json!({"step": "parse", "progress": 40}))
        );
    }

    #[tokio::test]
    async fn test_query_folds_expected_failures() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_query()
            .with(eq("gone"), eq(DEFAULT_STATUS_QUERY))
            .returning(|id, _| Err(Error::NotFound(format!("workflow {}", id))));
        engine
            .expect_query()
            .with(eq("old"), eq(DEFAULT_STATUS_QUERY))
            .returning(|id, query| {
                Err(Error::QueryUnsupported {
                    workflow_id: id.to_string(),
                    query: query.to_string(),
                })
            });

        let poller = poller(engine);
        assert_eq!(poller.query("gone").await.unwrap(), QueryOutcome::NotFound);
        assert_eq!(poller.query("old").await.unwrap(), QueryOutcome::Unsupported);
    }

    #[tokio::test]
    async fn test_query_propagates_other_errors() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_query()
            .returning(|_, _| Err(Error::BackendUnavailable("connection refused".to_string())));

        let result = poller(engine).query("analyze-1").await;
        assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    }

    #[tokio::test]
    async fn test_poll_never_fails() {
        let mut engine = MockWorkflowEngine::new();
        engine.expect_name().return_const("mock");
        engine
            .expect_query()
            .returning(|_, _| Err(Error::BackendUnavailable("connection refused".to_string())));

        assert_eq!(poller(engine).poll("analyze-1").await, None);
    }

    #[tokio::test]
    async fn test_poll_skips_not_found() {
        let mut engine = MockWorkflowEngine::new();
        engine
            .expect_query()
            .returning(|id, _| Err(Error::NotFound(id.to_string())));

        assert_eq!(poller(engine).poll("analyze-1").await, None);
    }
