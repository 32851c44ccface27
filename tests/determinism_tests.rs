//! Determinism properties: replay yields the recorded activity at every
//! recorded position, resumption is idempotent, replay performs no side
//! effects, and divergence from history is detected and terminalized.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use revenant::providers::in_memory::InMemoryHistoryStore;
use revenant::{
    ActivityRegistry, Engine, EventKind, HistoryStore, InvocationStatus, WorkflowRegistry,
};

mod common;

/// Three sequential `Add1` calls; the canonical deterministic routine.
fn counter_workflows() -> WorkflowRegistry {
    WorkflowRegistry::builder()
        .register("Counter", |ctx, input: String| async move {
            let a = ctx.call_activity("Add1", input).await?;
            let b = ctx.call_activity("Add1", a).await?;
            let c = ctx.call_activity("Add1", b).await?;
            Ok(c)
        })
        .build()
}

fn add1_activities(executions: Arc<AtomicUsize>) -> ActivityRegistry {
    ActivityRegistry::builder()
        .register("Add1", move |input: String| {
            let executions = executions.clone();
            async move {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok((input.parse::<i64>().map_err(|e| e.to_string())? + 1).to_string())
            }
        })
        .build()
}

#[tokio::test]
async fn completed_orchestration_replays_with_no_new_events() {
    let store = Arc::new(InMemoryHistoryStore::default());
    let executions = Arc::new(AtomicUsize::new(0));
    let engine = Engine::with_id_minter(
        store.clone(),
        common::RecordingScheduler::new(),
        Arc::new(add1_activities(executions.clone())),
        counter_workflows(),
        Arc::new(common::FixedIdMinter("inst-det-1".into())),
    );

    let outcome = engine.drive_to_completion("Counter", "0").await.unwrap();
    assert_eq!(
        outcome.status,
        InvocationStatus::Complete { output: "3".into() }
    );
    assert_eq!(executions.load(Ordering::SeqCst), 3);

    let history = store.load_events("inst-det-1").await.unwrap();
    // Started + three schedule/complete pairs + terminal.
    assert_eq!(history.len(), 8);

    // Replay against the terminal history: same answer, zero appends,
    // zero side effects.
    for _ in 0..2 {
        let again = engine.resume("inst-det-1").await.unwrap();
        assert_eq!(
            again.status,
            InvocationStatus::Complete { output: "3".into() }
        );
    }
    assert_eq!(executions.load(Ordering::SeqCst), 3);
    assert_eq!(store.load_events("inst-det-1").await.unwrap().len(), 8);
}

#[tokio::test]
async fn replay_yields_recorded_activity_names_in_position_order() {
    let store = Arc::new(InMemoryHistoryStore::default());
    let engine = Engine::with_id_minter(
        store.clone(),
        common::RecordingScheduler::new(),
        Arc::new(add1_activities(Arc::new(AtomicUsize::new(0)))),
        counter_workflows(),
        Arc::new(common::FixedIdMinter("inst-det-2".into())),
    );
    engine.drive_to_completion("Counter", "0").await.unwrap();

    let history = store.load_events("inst-det-2").await.unwrap();
    let scheduled: Vec<(u64, String)> = history
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ActivityScheduled {
                activity_id, name, ..
            } => Some((*activity_id, name.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        scheduled,
        vec![(0, "Add1".into()), (1, "Add1".into()), (2, "Add1".into())],
        "activity identity is positional and stable across replays"
    );
}

#[tokio::test]
async fn resuming_twice_against_identical_histories_decides_identically() {
    // Two engines over two stores seeded with the same partial history
    // must append the same events and report the same outcome.
    let seed = vec![
        EventKind::OrchestrationStarted {
            name: "Counter".into(),
            input: "0".into(),
        },
        EventKind::ActivityScheduled {
            activity_id: 0,
            name: "Add1".into(),
            input: "0".into(),
        },
        EventKind::ActivityCompleted {
            activity_id: 0,
            result: "1".into(),
        },
    ];

    let mut appended = Vec::new();
    let mut outcomes = Vec::new();
    for run in 0..2 {
        let store = Arc::new(InMemoryHistoryStore::default());
        let id = format!("inst-idem-{run}");
        common::seed_history(store.as_ref(), &id, seed.clone()).await;
        let engine = Engine::new(
            store.clone(),
            common::RecordingScheduler::new(),
            Arc::new(add1_activities(Arc::new(AtomicUsize::new(0)))),
            counter_workflows(),
        );
        let outcome = engine.resume(&id).await.unwrap();
        let history = store.load_events(&id).await.unwrap();
        appended.push(common::kinds(&history[seed.len()..]));
        outcomes.push(outcome.status);
    }
    assert_eq!(appended[0], appended[1]);
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(
        appended[0],
        vec![
            EventKind::ActivityScheduled {
                activity_id: 1,
                name: "Add1".into(),
                input: "1".into()
            },
            EventKind::ActivityCompleted {
                activity_id: 1,
                result: "2".into()
            },
        ]
    );
}

#[tokio::test]
async fn name_divergence_is_detected_and_terminalizes_the_log() {
    let store = Arc::new(InMemoryHistoryStore::default());
    // History says position 0 was "A"; the routine asks for "B".
    common::seed_history(
        store.as_ref(),
        "inst-div-1",
        vec![
            EventKind::OrchestrationStarted {
                name: "Diverging".into(),
                input: "".into(),
            },
            EventKind::ActivityScheduled {
                activity_id: 0,
                name: "A".into(),
                input: "".into(),
            },
            EventKind::ActivityCompleted {
                activity_id: 0,
                result: "ok".into(),
            },
        ],
    )
    .await;

    let workflows = WorkflowRegistry::builder()
        .register("Diverging", |ctx, _input: String| async move {
            ctx.call_activity("B", "").await
        })
        .build();
    let engine = Engine::new(
        store.clone(),
        common::RecordingScheduler::new(),
        Arc::new(ActivityRegistry::builder().build()),
        workflows,
    );

    let outcome = engine.resume("inst-div-1").await.unwrap();
    match outcome.status {
        InvocationStatus::Failed { error } => assert!(error.contains("nondeterministic replay")),
        other => panic!("expected failure, got {other:?}"),
    }

    let history = store.load_events("inst-div-1").await.unwrap();
    assert!(
        matches!(
            history.last().unwrap().kind,
            EventKind::OrchestrationFailed { .. }
        ),
        "divergence appends a terminal event so the log never replays into the same wall"
    );
}

#[tokio::test]
async fn input_divergence_is_detected_too() {
    let store = Arc::new(InMemoryHistoryStore::default());
    common::seed_history(
        store.as_ref(),
        "inst-div-2",
        vec![
            EventKind::OrchestrationStarted {
                name: "Diverging".into(),
                input: "".into(),
            },
            EventKind::ActivityScheduled {
                activity_id: 0,
                name: "A".into(),
                input: "recorded-input".into(),
            },
            EventKind::ActivityCompleted {
                activity_id: 0,
                result: "ok".into(),
            },
        ],
    )
    .await;

    let workflows = WorkflowRegistry::builder()
        .register("Diverging", |ctx, _input: String| async move {
            ctx.call_activity("A", "different-input").await
        })
        .build();
    let engine = Engine::new(
        store.clone(),
        common::RecordingScheduler::new(),
        Arc::new(ActivityRegistry::builder().build()),
        workflows,
    );

    let outcome = engine.resume("inst-div-2").await.unwrap();
    assert!(matches!(outcome.status, InvocationStatus::Failed { .. }));
}
