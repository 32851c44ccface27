use std::sync::Arc;

use revenant::providers::fs::FsHistoryStore;
use revenant::providers::in_memory::InMemoryHistoryStore;
use revenant::runtime::registry::ActivityHandler;
use revenant::scheduler::NoopScheduler;
use revenant::{
    ActivityRegistry, Engine, EventKind, HistoryEvent, HistoryStore, InvocationStatus, StoreError,
    WorkflowRegistry,
};

mod common;

#[test]
fn event_envelope_helpers() {
    let started = HistoryEvent::new(
        "i1",
        0,
        EventKind::OrchestrationStarted {
            name: "W".into(),
            input: "".into(),
        },
    );
    assert!(!started.is_orchestration_terminal());
    assert_eq!(started.activity_id(), None);

    let completed = HistoryEvent::new(
        "i1",
        3,
        EventKind::ActivityCompleted {
            activity_id: 1,
            result: "ok".into(),
        },
    );
    assert_eq!(completed.activity_id(), Some(1));
    assert!(!completed.is_orchestration_terminal());

    let terminal = HistoryEvent::new("i1", 4, EventKind::OrchestrationFailed { error: "e".into() });
    assert!(terminal.is_orchestration_terminal());
}

#[tokio::test]
async fn in_memory_store_append_load_list_reset() {
    let store = InMemoryHistoryStore::default();
    assert!(store.load_events("unknown").await.unwrap().is_empty());

    common::seed_history(
        &store,
        "i1",
        vec![
            EventKind::OrchestrationStarted {
                name: "W".into(),
                input: "x".into(),
            },
            EventKind::ActivityScheduled {
                activity_id: 0,
                name: "A".into(),
                input: "x".into(),
            },
        ],
    )
    .await;
    common::seed_history(
        &store,
        "i2",
        vec![EventKind::OrchestrationStarted {
            name: "W".into(),
            input: "y".into(),
        }],
    )
    .await;

    let h1 = store.load_events("i1").await.unwrap();
    assert_eq!(h1.len(), 2);
    assert_eq!(h1[1].event_id, 1);

    let mut ids = store.list_orchestrations().await;
    ids.sort();
    assert_eq!(ids, vec!["i1".to_string(), "i2".to_string()]);

    let dump = store.dump_all_pretty().await;
    assert!(dump.contains("orchestration=i1") && dump.contains("orchestration=i2"));

    store.reset().await;
    assert!(store.list_orchestrations().await.is_empty());
}

#[tokio::test]
async fn append_out_of_order_is_corrupt() {
    let store = InMemoryHistoryStore::default();
    let ev = HistoryEvent::new(
        "i1",
        5,
        EventKind::OrchestrationStarted {
            name: "W".into(),
            input: "".into(),
        },
    );
    let err = store.append_event("i1", ev).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}

#[tokio::test]
async fn fs_store_persists_one_jsonl_log_per_orchestration() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FsHistoryStore::new(tmp.path(), true);

    common::seed_history(
        &store,
        "fs-1",
        vec![
            EventKind::OrchestrationStarted {
                name: "W".into(),
                input: "1".into(),
            },
            EventKind::ActivityScheduled {
                activity_id: 0,
                name: "A".into(),
                input: "1".into(),
            },
            EventKind::ActivityCompleted {
                activity_id: 0,
                result: "2".into(),
            },
        ],
    )
    .await;

    // A second store over the same root sees the same log.
    let reopened = FsHistoryStore::new(tmp.path(), false);
    let history = reopened.load_events("fs-1").await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(
        history[2].kind,
        EventKind::ActivityCompleted {
            activity_id: 0,
            result: "2".into()
        }
    );
    assert!(reopened.load_events("fs-ghost").await.unwrap().is_empty());

    let ids = reopened.list_orchestrations().await;
    assert_eq!(ids, vec!["fs-1".to_string()]);

    reopened.reset().await;
    assert!(reopened.list_orchestrations().await.is_empty());
}

#[tokio::test]
async fn fs_store_cap_guard_rejects_runaway_logs() {
    let tmp = tempfile::tempdir().unwrap();
    let store = FsHistoryStore::new_with_cap(tmp.path(), true, 2);
    common::seed_history(
        &store,
        "capped",
        vec![
            EventKind::OrchestrationStarted {
                name: "W".into(),
                input: "".into(),
            },
            EventKind::ActivityScheduled {
                activity_id: 0,
                name: "A".into(),
                input: "".into(),
            },
        ],
    )
    .await;
    let err = store
        .append_event(
            "capped",
            HistoryEvent::new(
                "capped",
                2,
                EventKind::ActivityCompleted {
                    activity_id: 0,
                    result: "r".into(),
                },
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::CapExceeded { cap: 2, .. }));
}

#[test]
fn workflow_registry_detects_duplicate_registration() {
    let result = WorkflowRegistry::builder()
        .register("Same", |_ctx, _input| async move { Ok("a".into()) })
        .register("Same", |_ctx, _input| async move { Ok("b".into()) })
        .build_result();
    assert!(result.unwrap_err().contains("duplicate workflow registration"));
}

#[tokio::test]
async fn activity_registry_typed_roundtrip() {
    let activities = ActivityRegistry::builder()
        .register_typed("Double", |n: i64| async move { Ok(n * 2) })
        .build();
    let handler = activities.get("Double").expect("registered");
    assert_eq!(handler.invoke("21".into()).await.unwrap(), "42");
    assert!(activities.get("Missing").is_none());
}

#[tokio::test]
async fn engine_runs_a_single_activity_workflow() {
    let store = Arc::new(InMemoryHistoryStore::default());
    let activities = ActivityRegistry::builder()
        .register("Echo", |input: String| async move { Ok(input) })
        .build();
    let workflows = WorkflowRegistry::builder()
        .register("EchoFlow", |ctx, input: String| async move {
            ctx.call_activity("Echo", input).await
        })
        .build();
    let engine = Engine::new(
        store.clone(),
        Arc::new(NoopScheduler),
        Arc::new(activities),
        workflows,
    );

    let outcome = engine.drive_to_completion("EchoFlow", "hello").await.unwrap();
    assert_eq!(
        outcome.status,
        InvocationStatus::Complete {
            output: "hello".into()
        }
    );

    let history = store.load_events(&outcome.orchestration_id).await.unwrap();
    let kinds = common::kinds(&history);
    assert_eq!(
        kinds,
        vec![
            EventKind::OrchestrationStarted {
                name: "EchoFlow".into(),
                input: "hello".into()
            },
            EventKind::ActivityScheduled {
                activity_id: 0,
                name: "Echo".into(),
                input: "hello".into()
            },
            EventKind::ActivityCompleted {
                activity_id: 0,
                result: "hello".into()
            },
            EventKind::OrchestrationCompleted {
                output: "hello".into()
            },
        ]
    );
}

#[tokio::test]
async fn workflow_with_no_activities_completes_in_one_invocation() {
    let store = Arc::new(InMemoryHistoryStore::default());
    let workflows = WorkflowRegistry::builder()
        .register("Constant", |_ctx, _input: String| async move {
            Ok("42".into())
        })
        .build();
    let engine = Engine::new(
        store.clone(),
        Arc::new(NoopScheduler),
        Arc::new(ActivityRegistry::builder().build()),
        workflows,
    );

    let outcome = engine.start("Constant", "").await.unwrap();
    assert_eq!(
        outcome.status,
        InvocationStatus::Complete { output: "42".into() }
    );
    let history = store.load_events(&outcome.orchestration_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[1].is_orchestration_terminal());
}
