//! Integration tests for feature stores and the undo extension

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use serde_json::json;
use slicestore_core::action::lifecycle;
use slicestore_runtime::{
    FeatureStore, StateOrCallback, Store, StoreConfig, StoreError, UndoExtension,
};
use slicestore_testing::fixtures::UserState;
use slicestore_testing::mocks::{CallLog, RecordingExtension};
use std::sync::{Arc, Mutex};

fn undo_store(log: &CallLog) -> Store {
    let store = Store::new();
    store
        .configure(
            StoreConfig::default()
                .with_extension(UndoExtension::new())
                .with_extension(RecordingExtension::new(log.clone())),
        )
        .unwrap();
    store
}

// ============================================================================
// State
// ============================================================================

#[test]
fn initial_state_is_published_to_the_store() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    assert_eq!(user.key(), "user");
    assert_eq!(
        store.state(|state| state.get("user").cloned()),
        Some(json!({"firstName": "Bruce", "lastName": "Willis", "age": 30}))
    );
}

#[test]
fn set_state_merges_patch_and_returns_action() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    let action = user.set_state(json!({"firstName": "John"}), Some("rename"));

    assert_eq!(action.action_type(), "@slicestore/set-state/user/rename");
    assert_eq!(action.payload(), Some(&json!({"firstName": "John"})));
    assert_eq!(
        user.state(),
        UserState {
            first_name: "John".to_string(),
            ..UserState::bruce()
        }
    );
}

#[test]
fn set_state_callback_uses_latest_state() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    for _ in 0..3 {
        user.set_state(
            StateOrCallback::callback(|state: &UserState| json!({"age": state.age + 1})),
            None,
        );
    }

    assert_eq!(user.state().age, 33);
}

#[test]
fn set_state_with_typed_patch() {
    #[derive(serde::Serialize)]
    struct AgePatch {
        age: u32,
    }

    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    user.set_state(StateOrCallback::patch(&AgePatch { age: 50 }).unwrap(), None);

    assert_eq!(user.state().age, 50);
    assert_eq!(user.state().first_name, "Bruce");
}

#[test]
fn set_state_does_not_touch_keys_sharing_a_prefix() {
    let store = Store::new();
    let a = FeatureStore::new(&store, "a", UserState::bruce()).unwrap();
    let ab = FeatureStore::new(&store, "ab", UserState::bruce()).unwrap();

    a.set_state(json!({"age": 99}), None);
    a.set_state(json!({"firstName": "Ann"}), Some("name"));

    assert_eq!(a.state().age, 99);
    assert_eq!(ab.state(), UserState::bruce());
}

#[test]
fn duplicate_feature_store_key_fails() {
    let store = Store::new();
    let _user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    let result = FeatureStore::new(&store, "user", UserState::default());
    assert!(matches!(result, Err(StoreError::FeatureExists(key)) if key == "user"));
}

#[test]
fn select_emits_distinct_values() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let names = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&names);

    user.hold(user.select(|state| state.first_name.clone()).subscribe(move |name| {
        seen.lock().unwrap().push(name);
    }));

    user.set_state(json!({"age": 31}), None);
    user.set_state(json!({"firstName": "John"}), None);
    user.set_state(json!({"firstName": "John"}), None);

    assert_eq!(*names.lock().unwrap(), vec!["Bruce", "John"]);
}

#[test]
fn destroy_removes_only_its_own_slice() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let other = FeatureStore::new(&store, "other", UserState::bruce()).unwrap();
    let calls = Arc::new(Mutex::new(0));
    let counted = Arc::clone(&calls);

    user.hold(user.select_state().subscribe(move |_| {
        *counted.lock().unwrap() += 1;
    }));

    user.destroy();
    other.set_state(json!({"age": 1}), None);

    assert_eq!(*calls.lock().unwrap(), 1);
    assert!(!store.state(|state| state.contains_key("user")));
    assert_eq!(other.state().age, 1);

    // The key is free again
    FeatureStore::new(&store, "user", UserState::default()).unwrap();
}

// ============================================================================
// Undo
// ============================================================================

#[test]
fn undo_requires_the_undo_extension() {
    let store = Store::new();
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let action = user.set_state(json!({"age": 40}), None);

    assert!(matches!(user.undo(&action), Err(StoreError::UndoExtensionMissing)));
}

#[test]
fn undo_restores_slice_but_keeps_later_writes() {
    let log = CallLog::new();
    let store = undo_store(&log);
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    let rename = user.set_state(json!({"firstName": "John"}), Some("rename"));
    user.set_state(json!({"age": 40}), None);

    user.undo(&rename).unwrap();

    assert_eq!(
        user.state(),
        UserState {
            age: 40,
            ..UserState::bruce()
        }
    );
}

#[test]
fn recording_extension_never_sees_undo_replays() {
    let log = CallLog::new();
    let store = undo_store(&log);
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();

    let rename = user.set_state(json!({"firstName": "John"}), Some("rename"));
    user.set_state(json!({"age": 40}), None);
    log.clear();

    user.undo(&rename).unwrap();

    assert_eq!(log.entries(), vec![lifecycle::UNDO]);
}

#[test]
fn undo_of_unknown_action_leaves_state_alone() {
    let log = CallLog::new();
    let store = undo_store(&log);
    let user = FeatureStore::new(&store, "user", UserState::bruce()).unwrap();
    let other = FeatureStore::new(&store, "other", UserState::bruce()).unwrap();

    user.set_state(json!({"age": 40}), None);
    let never_dispatched = slicestore_core::action::Action::new("never");
    other.undo(&never_dispatched).unwrap();

    assert_eq!(user.state().age, 40);
}
