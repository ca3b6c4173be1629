//! Undo extension
//!
//! Records the most recent actions together with the state before the oldest
//! of them. An `@slicestore/undo` action removes its target from the record
//! and recomputes the state by replaying the remaining actions from that base
//! state, so later writes survive the undo.

use crate::extension::{ExtensionContext, ExtensionId, ExtensionSortOrder, StoreExtension};
use crate::lock;
use slicestore_core::action::{Action, lifecycle};
use slicestore_core::reducer::{BoxedReducer, MetaReducer, reducer_fn};
use slicestore_core::state::AppState;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Number of actions remembered by default
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Makes [`FeatureStore::undo`](crate::FeatureStore::undo) available
#[derive(Debug, Clone, Copy)]
pub struct UndoExtension {
    buffer_size: usize,
}

impl UndoExtension {
    /// Remember the last [`DEFAULT_BUFFER_SIZE`] actions
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Remember the last `buffer_size` actions (at least one)
    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = if buffer_size == 0 { 1 } else { buffer_size };
        self
    }

    /// Number of actions that can be undone
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl Default for UndoExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreExtension for UndoExtension {
    fn id(&self) -> ExtensionId {
        ExtensionId::Undo
    }

    fn sort_order(&self) -> ExtensionSortOrder {
        ExtensionSortOrder::Undo
    }

    fn init(&self, context: &ExtensionContext) {
        context.add_meta_reducer(Arc::new(UndoMetaReducer {
            buffer_size: self.buffer_size,
            history: Arc::new(Mutex::new(UndoHistory::default())),
        }));
    }
}

#[derive(Default)]
struct UndoHistory {
    executed: VecDeque<Action>,
    /// State before the oldest action of `executed`
    base_state: Option<AppState>,
}

/// The history outlives every wrapped reducer: the store re-wraps its root
/// reducer whenever a feature is added or removed.
struct UndoMetaReducer {
    buffer_size: usize,
    history: Arc<Mutex<UndoHistory>>,
}

impl MetaReducer<AppState> for UndoMetaReducer {
    fn wrap(&self, inner: BoxedReducer<AppState>) -> BoxedReducer<AppState> {
        let history = Arc::clone(&self.history);
        let buffer_size = self.buffer_size;

        reducer_fn(move |state: AppState, action: &Action| {
            if action.is(lifecycle::UNDO) {
                return undo(&history, &inner, state, action);
            }

            let overflow = {
                let mut history = lock(&history);
                if history.base_state.is_none() {
                    history.base_state = Some(state.clone());
                }
                history.executed.push_back(action.clone());
                if history.executed.len() > buffer_size {
                    history.executed.pop_front().zip(history.base_state.take())
                } else {
                    None
                }
            };

            if let Some((oldest, base_state)) = overflow {
                let folded = inner.reduce(base_state, &oldest);
                lock(&history).base_state = Some(folded);
            }

            inner.reduce(state, action)
        })
    }
}

fn undo(
    history: &Mutex<UndoHistory>,
    inner: &BoxedReducer<AppState>,
    state: AppState,
    action: &Action,
) -> AppState {
    let Some(target) = lifecycle::undo_target(action) else {
        tracing::warn!("Undo action without a valid target, ignoring");
        return state;
    };

    let replay = {
        let mut history = lock(history);
        match history.executed.iter().rposition(|executed| *executed == target) {
            Some(position) => {
                history.executed.remove(position);
                history
                    .base_state
                    .clone()
                    .map(|base_state| (base_state, history.executed.clone()))
            },
            None => None,
        }
    };

    let Some((base_state, actions)) = replay else {
        tracing::warn!(
            action_type = target.action_type(),
            "Action to undo is not in the undo buffer, ignoring"
        );
        return state;
    };

    tracing::debug!(
        action_type = target.action_type(),
        replayed = actions.len(),
        "Undoing action"
    );

    actions
        .iter()
        .fold(base_state, |state, action| inner.reduce(state, action))
}
