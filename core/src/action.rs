//! Actions - the single input type of the store
//!
//! An [`Action`] is a tagged record: a required `type` discriminator plus an
//! open set of extra fields. By convention data travels in the `payload`
//! field. Actions are immutable once built; the builder methods consume `self`.
//!
//! # Example
//!
//! ```
//! use slicestore_core::action::Action;
//! use serde_json::json;
//!
//! let action = Action::with_payload("updateUser", json!({ "firstName": "Nicolas" }));
//! assert_eq!(action.action_type(), "updateUser");
//! assert_eq!(action.payload(), Some(&json!({ "firstName": "Nicolas" })));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Name of the conventional payload field
pub const PAYLOAD_FIELD: &str = "payload";

/// A discriminated event value driving a state transition
///
/// Serializes as a flat JSON object: `{"type": "...", "payload": ..., ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl Action {
    /// Create an action carrying only its type
    #[must_use]
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            fields: Map::new(),
        }
    }

    /// Create an action with a `payload` field
    #[must_use]
    pub fn with_payload(action_type: impl Into<String>, payload: Value) -> Self {
        Self::new(action_type).with_field(PAYLOAD_FIELD, payload)
    }

    /// Return a copy of this action with an extra field set
    ///
    /// The `type` key is reserved and ignored here.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "type" {
            self.fields.insert(key, value);
        }
        self
    }

    /// The dispatch discriminator
    #[must_use]
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// Whether this action has the given type
    #[must_use]
    pub fn is(&self, action_type: &str) -> bool {
        self.action_type == action_type
    }

    /// The conventional `payload` field, if present
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.fields.get(PAYLOAD_FIELD)
    }

    /// Deserialize the payload into a concrete type
    ///
    /// Returns `Ok(None)` when the action carries no payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.payload()
            .map(|payload| serde_json::from_value(payload.clone()))
            .transpose()
    }

    /// Any extra field by name
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All extra fields (everything but `type`)
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.action_type)
    }
}

impl From<&str> for Action {
    fn from(action_type: &str) -> Self {
        Self::new(action_type)
    }
}

impl From<String> for Action {
    fn from(action_type: String) -> Self {
        Self::new(action_type)
    }
}

/// Action types the store dispatches for its own lifecycle
///
/// All of them live under the [`NAMESPACE`](lifecycle::NAMESPACE) prefix so they
/// never collide with application action types.
pub mod lifecycle {
    use super::Action;
    use serde_json::Value;

    /// Prefix shared by every internal action type
    pub const NAMESPACE: &str = "@slicestore";

    /// Dispatched once when `configure` completes
    pub const INIT_STORE: &str = "@slicestore/init-store";

    /// Type of the undo action interpreted by the undo extension
    pub const UNDO: &str = "@slicestore/undo";

    /// Build a namespaced action type, optionally scoped to a feature key
    #[must_use]
    pub fn action_type(kind: &str, feature_key: Option<&str>) -> String {
        match feature_key {
            Some(key) => format!("{NAMESPACE}/{kind}/{key}"),
            None => format!("{NAMESPACE}/{kind}"),
        }
    }

    /// `@slicestore/init-store`
    #[must_use]
    pub fn init_store() -> Action {
        Action::new(INIT_STORE)
    }

    /// `@slicestore/init-feature/<key>`
    #[must_use]
    pub fn init_feature(key: &str) -> Action {
        Action::new(action_type("init-feature", Some(key)))
    }

    /// `@slicestore/destroy-feature/<key>` carrying the key as payload
    #[must_use]
    pub fn destroy_feature(key: &str) -> Action {
        Action::with_payload(
            action_type("destroy-feature", Some(key)),
            Value::String(key.to_string()),
        )
    }

    /// Base type of the set-state actions of a feature store
    #[must_use]
    pub fn set_state_type(key: &str) -> String {
        action_type("set-state", Some(key))
    }

    /// Wrap an action into an undo request
    ///
    /// Falls back to a `Null` payload if the action cannot be serialized,
    /// which the undo extension ignores.
    #[must_use]
    pub fn undo(action: &Action) -> Action {
        let payload = serde_json::to_value(action).unwrap_or(Value::Null);
        Action::with_payload(UNDO, payload)
    }

    /// The action an undo request refers to
    #[must_use]
    pub fn undo_target(action: &Action) -> Option<Action> {
        if !action.is(UNDO) {
            return None;
        }
        action
            .payload()
            .and_then(|payload| serde_json::from_value(payload.clone()).ok())
    }

    /// Whether the action is one of the store's internal actions
    #[must_use]
    pub fn is_internal(action: &Action) -> bool {
        action
            .action_type()
            .strip_prefix(NAMESPACE)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}
