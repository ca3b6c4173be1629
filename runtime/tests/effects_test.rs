//! Integration tests for effects
//!
//! Store effects consume the action stream and dispatch their output; feature
//! store effects consume trigger payloads and patch their slice. Faults are
//! contained: the pipeline is rebuilt and keeps serving later triggers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use futures::StreamExt;
use serde_json::{Value, json};
use slicestore_core::action::Action;
use slicestore_core::state::AppState;
use slicestore_runtime::{
    Actions, EffectConfig, FeatureConfig, FeatureStore, Payloads, StateOrCallback, Store, StoreError,
};
use slicestore_testing::fixtures::{UserState, counter_reducer};
use slicestore_testing::{init_test_tracing, wait_for};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

fn counter_value(state: &AppState) -> Option<i64> {
    state
        .get("counter")
        .and_then(|slice| slice.get("counter"))
        .and_then(Value::as_i64)
}

async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn counter_store() -> Store {
    let store = Store::new();
    store
        .register_feature("counter", counter_reducer(), FeatureConfig::default())
        .unwrap();
    store
}

// ============================================================================
// Store effects
// ============================================================================

#[tokio::test]
async fn store_effect_dispatches_its_output() {
    init_test_tracing();
    let store = counter_store();

    let _effect = store
        .create_effect(|actions: Actions| {
            actions
                .of_type(["ping"])
                .map(|_| Ok::<_, String>(Action::new("counter")))
        })
        .unwrap();

    store.dispatch(Action::new("ping"));

    let counter = wait_for(&store.select(counter_value), |value| *value == Some(2), TIMEOUT).await;
    assert_eq!(counter, Some(Some(2)));
}

#[tokio::test]
async fn non_dispatching_effect_output_is_dropped() {
    let store = counter_store();
    let outputs = Arc::new(AtomicUsize::new(0));
    let produced = Arc::clone(&outputs);

    let _effect = store
        .create_effect_with(EffectConfig::default().with_dispatch(false), move |actions: Actions| {
            let produced = Arc::clone(&produced);
            actions.of_type(["ping"]).map(move |_| {
                produced.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Action::new("counter"))
            })
        })
        .unwrap();

    store.dispatch(Action::new("ping"));
    eventually(|| outputs.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(store.state(counter_value), Some(1));
}

#[tokio::test]
async fn failing_store_effect_keeps_serving_later_actions() {
    let store = counter_store();

    let _effect = store
        .create_effect(|actions: Actions| {
            actions
                .of_type(["ping", "explode"])
                .map(|action| {
                    if action.is("explode") {
                        Err("exploded".to_string())
                    } else {
                        Ok(Action::new("counter"))
                    }
                })
        })
        .unwrap();

    store.dispatch(Action::new("explode"));
    store.dispatch(Action::new("ping"));
    store.dispatch(Action::new("explode"));
    store.dispatch(Action::new("ping"));

    let counter = wait_for(&store.select(counter_value), |value| *value == Some(3), TIMEOUT).await;
    assert_eq!(counter, Some(Some(3)));
}

#[tokio::test]
async fn effect_stops_after_resubscription_budget() {
    let store = counter_store();

    let effect = store
        .create_effect_with(
            EffectConfig::default().with_max_resubscriptions(1),
            |actions: Actions| actions.map(|_| Err::<Action, _>("always")),
        )
        .unwrap();

    store.dispatch(Action::new("a"));
    store.dispatch(Action::new("b"));

    eventually(|| effect.is_finished()).await;
}

#[tokio::test]
async fn store_effect_raising_on_every_action_runs_once_per_action() {
    let store = counter_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let effect = store
        .create_effect(move |actions: Actions| {
            let counted = Arc::clone(&counted);
            actions.of_type(["load"]).map(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Err::<Action, _>("load failed")
            })
        })
        .unwrap();

    store.dispatch(Action::new("load"));
    store.dispatch(Action::new("load"));
    store.dispatch(Action::new("load"));

    eventually(|| calls.load(Ordering::SeqCst) == 3).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!effect.is_finished());
    assert_eq!(store.state(counter_value), Some(1));
}

#[tokio::test]
async fn store_effect_gives_up_once_resubscriptions_run_out() {
    let store = counter_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let effect = store
        .create_effect_with(EffectConfig::default().with_max_resubscriptions(2), move |actions: Actions| {
            let counted = Arc::clone(&counted);
            actions.of_type(["load"]).map(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Err::<Action, _>("load failed")
            })
        })
        .unwrap();

    for _ in 0..5 {
        store.dispatch(Action::new("load"));
    }
    eventually(|| effect.is_finished()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    store.dispatch(Action::new("load"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn effects_require_a_runtime() {
    let store = counter_store();
    let result = store.create_effect(|actions: Actions| actions.map(Ok::<Action, String>));
    assert!(matches!(result, Err(StoreError::NoRuntime)));
}

// ============================================================================
// Feature store effects
// ============================================================================

#[tokio::test]
async fn producer_raising_on_every_trigger_runs_once_per_trigger() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let trigger = user
        .effect(move |payloads: Payloads<()>| {
            let counted = Arc::clone(&counted);
            payloads.then(move |()| {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err::<StateOrCallback<UserState>, _>("producer failed")
                }
            })
        })
        .unwrap();

    trigger.trigger(());
    trigger.trigger(());
    trigger.trigger(());

    eventually(|| calls.load(Ordering::SeqCst) == 3).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(user.state(), UserState::bruce());
}

#[tokio::test]
async fn panicking_producer_is_isolated() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    let trigger = user
        .effect(|payloads: Payloads<u32>| {
            payloads.map(|age| {
                assert!(age < 100, "unrealistic age");
                Ok::<_, String>(StateOrCallback::from(json!({"age": age})))
            })
        })
        .unwrap();

    trigger.trigger(200);
    trigger.trigger(42);

    let age = wait_for(&user.select(|state| state.age), |age| *age == 42, TIMEOUT).await;
    assert_eq!(age, Some(42));
}

#[tokio::test]
async fn named_effect_dispatches_named_set_state() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let mut actions = store.actions();

    let trigger = user
        .effect_named("rename", |payloads: Payloads<String>| {
            payloads.map(|name| Ok::<_, String>(StateOrCallback::from(json!({"firstName": name}))))
        })
        .unwrap();
    trigger.trigger("John".to_string());

    let action = tokio::time::timeout(TIMEOUT, actions.next()).await.unwrap().unwrap();
    assert_eq!(action.action_type(), "@slicestore/set-state/user/rename");
    assert_eq!(user.state().first_name, "John");
}

#[tokio::test]
async fn destroyed_feature_store_stops_its_effects() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);

    let trigger = user
        .effect(move |payloads: Payloads<()>| {
            let counted = Arc::clone(&counted);
            payloads.map(move |()| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(StateOrCallback::from(json!({"age": 31})))
            })
        })
        .unwrap();

    user.destroy();
    trigger.trigger(());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!store.state(|state| state.contains_key("user")));
}

#[tokio::test]
async fn destroy_cancels_work_in_flight() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    let (on_start, on_finish) = (Arc::clone(&started), Arc::clone(&finished));

    let trigger = user
        .effect(move |payloads: Payloads<()>| {
            let on_start = Arc::clone(&on_start);
            let on_finish = Arc::clone(&on_finish);
            payloads.then(move |()| {
                let on_start = Arc::clone(&on_start);
                let on_finish = Arc::clone(&on_finish);
                async move {
                    on_start.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    on_finish.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(StateOrCallback::from(json!({"age": 31})))
                }
            })
        })
        .unwrap();
    let mut actions = store.actions();

    trigger.trigger(());
    eventually(|| started.load(Ordering::SeqCst) == 1).await;
    user.destroy();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut seen = Vec::new();
    while let Ok(Some(action)) = tokio::time::timeout(Duration::from_millis(10), actions.next()).await {
        seen.push(action.action_type().to_string());
    }

    assert_eq!(finished.load(Ordering::SeqCst), 0);
    assert!(seen.iter().all(|action_type| !action_type.starts_with("@slicestore/set-state")));
    assert!(!store.state(|state| state.contains_key("user")));
}
