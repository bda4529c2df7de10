//! Named properties and the shared property store.
//!
//! Properties are declared by modules and addressed by qualified name
//! (`module:name`). Children pushed onto a property are addressed as
//! `module:name:child`. Each property has three signals:
//!
//! | Signal | Queued when |
//! |--------|-------------|
//! | `<property>:changed` | the value is set |
//! | `<property>:pushed` | a child is pushed onto it |
//! | `<property>:popped` | a child is popped from it |
//!
//! The store is shared between the scheduling loop and running actions,
//! so it sits behind a [`DashMap`]. Whether a *state* may touch a property
//! is checked by [`ActionContext`](crate::ActionContext); the store only
//! enforces the property's own permission flags.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::signal::{qualify, SignalRef};

pub const CHANGED: &str = "changed";
pub const PUSHED: &str = "pushed";
pub const POPPED: &str = "popped";

/// `<property>:changed`
pub fn changed_signal(property: &str) -> String {
    qualify(property, CHANGED)
}

/// `<property>:pushed`
pub fn pushed_signal(property: &str) -> String {
    qualify(property, PUSHED)
}

/// `<property>:popped`
pub fn popped_signal(property: &str) -> String {
    qualify(property, POPPED)
}

/// Property declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    name: String,
    default: Value,
    allow_read: bool,
    allow_write: bool,
    allow_push: bool,
    allow_pop: bool,
}

impl Property {
    /// Declare `module:name` with a `null` default and every operation
    /// allowed.
    pub fn new(module: &str, name: &str) -> Self {
        Self::qualified(qualify(module, name))
    }

    fn qualified(name: String) -> Self {
        Self {
            name,
            default: Value::Null,
            allow_read: true,
            allow_write: true,
            allow_push: true,
            allow_pop: true,
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }

    pub fn allow_read(mut self, allow: bool) -> Self {
        self.allow_read = allow;
        self
    }

    pub fn allow_write(mut self, allow: bool) -> Self {
        self.allow_write = allow;
        self
    }

    pub fn allow_push(mut self, allow: bool) -> Self {
        self.allow_push = allow;
        self
    }

    pub fn allow_pop(mut self, allow: bool) -> Self {
        self.allow_pop = allow;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn changed(&self) -> SignalRef {
        SignalRef::new(changed_signal(&self.name))
    }

    pub fn pushed(&self) -> SignalRef {
        SignalRef::new(pushed_signal(&self.name))
    }

    pub fn popped(&self) -> SignalRef {
        SignalRef::new(popped_signal(&self.name))
    }
}

impl AsRef<str> for Property {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

#[derive(Debug)]
struct Entry {
    decl: Property,
    value: Value,
    parent: Option<String>,
    changes: u64,
}

/// Live property values.
#[derive(Debug, Default)]
pub struct PropertyStore {
    entries: DashMap<String, Entry>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration. Re-registering resets the value to the
    /// new default.
    pub fn register(&self, decl: Property) {
        let name = decl.name.clone();
        let value = decl.default.clone();
        self.entries.insert(
            name,
            Entry {
                decl,
                value,
                parent: None,
                changes: 0,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parent of a child property, `None` for top-level properties.
    pub fn parent_of(&self, name: &str) -> Option<String> {
        self.entries.get(name).and_then(|e| e.parent.clone())
    }

    /// How many times the property was set.
    pub fn change_count(&self, name: &str) -> Option<u64> {
        self.entries.get(name).map(|e| e.changes)
    }

    /// Read a value on behalf of `reader`.
    pub fn get(&self, reader: &str, name: &str) -> Result<Value, EngineError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| EngineError::UnknownProperty(name.to_string()))?;
        if !entry.decl.allow_read {
            return Err(EngineError::ReadDenied {
                state: reader.to_string(),
                property: name.to_string(),
            });
        }
        Ok(entry.value.clone())
    }

    /// Set a value on behalf of `writer` and return the name of the
    /// `changed` signal to queue.
    pub fn set(&self, writer: &str, name: &str, value: Value) -> Result<String, EngineError> {
        let mut entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownProperty(name.to_string()))?;
        if !entry.decl.allow_write {
            return Err(EngineError::WriteDenied {
                state: writer.to_string(),
                property: name.to_string(),
            });
        }
        entry.value = value;
        entry.changes += 1;
        Ok(changed_signal(name))
    }

    /// Push `child` onto `parent` and return the signal to queue:
    /// `<parent>:pushed` for a new child, `<child>:changed` when the child
    /// already existed and was overwritten.
    pub fn push(
        &self,
        writer: &str,
        parent: &str,
        child: &str,
        value: Value,
    ) -> Result<String, EngineError> {
        {
            let entry = self
                .entries
                .get(parent)
                .ok_or_else(|| EngineError::UnknownProperty(parent.to_string()))?;
            if !entry.decl.allow_push {
                return Err(EngineError::PushDenied {
                    state: writer.to_string(),
                    property: parent.to_string(),
                });
            }
        }

        let child_name = qualify(parent, child);
        if let Some(mut existing) = self.entries.get_mut(&child_name) {
            existing.value = value;
            existing.changes += 1;
            return Ok(changed_signal(&child_name));
        }

        let decl = Property::qualified(child_name.clone()).allow_push(false);
        self.entries.insert(
            child_name,
            Entry {
                decl,
                value,
                parent: Some(parent.to_string()),
                changes: 0,
            },
        );
        Ok(pushed_signal(parent))
    }

    /// Remove a child property. Returns `Ok(None)` if no such child exists,
    /// otherwise the `<parent>:popped` signal to queue.
    pub fn pop(&self, writer: &str, child: &str) -> Result<Option<String>, EngineError> {
        let parent = match self.entries.get(child) {
            None => return Ok(None),
            Some(entry) => entry
                .parent
                .clone()
                .ok_or_else(|| EngineError::NotAChild(child.to_string()))?,
        };
        let allowed = self
            .entries
            .get(&parent)
            .map(|p| p.decl.allow_pop)
            .unwrap_or(false);
        if !allowed {
            return Err(EngineError::PopDenied {
                state: writer.to_string(),
                property: parent,
            });
        }

        // Drop grandchildren along with the child so no orphan remains.
        let prefix = qualify(child, "");
        self.entries.retain(|name, _| !name.starts_with(&prefix));
        self.entries.remove(child);
        Ok(Some(popped_signal(&parent)))
    }

    /// Qualified names of the direct children of `parent`, sorted.
    pub fn children(&self, parent: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.parent.as_deref() == Some(parent))
            .map(|e| e.key().clone())
            .collect();
        out.sort();
        out
    }

    /// Copy of every value, keyed by qualified name.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value.clone()))
            .collect()
    }
}

/// Shared handle to a store.
pub type SharedProperties = Arc<PropertyStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> PropertyStore {
        let store = PropertyStore::new();
        store.register(Property::new("rawio", "out").default_value(""));
        store.register(Property::new("interloc", "all"));
        store.register(Property::new("nlp", "triples").allow_write(false));
        store
    }

    #[test]
    fn property_signals_are_qualified() {
        let prop = Property::new("interloc", "all");
        assert_eq!(prop.changed().name(), "interloc:all:changed");
        assert_eq!(prop.pushed().name(), "interloc:all:pushed");
        assert_eq!(prop.popped().name(), "interloc:all:popped");
    }

    #[test]
    fn set_counts_changes_and_returns_signal() {
        let store = store();
        assert_eq!(store.get("t", "rawio:out").unwrap(), json!(""));
        let sig = store.set("t", "rawio:out", json!("hi")).unwrap();
        assert_eq!(sig, "rawio:out:changed");
        store.set("t", "rawio:out", json!("hi")).unwrap();
        assert_eq!(store.change_count("rawio:out"), Some(2));
        assert_eq!(store.get("t", "rawio:out").unwrap(), json!("hi"));
    }

    #[test]
    fn write_flag_is_enforced() {
        let store = store();
        let err = store.set("t", "nlp:triples", json!([])).unwrap_err();
        assert_eq!(err.code(), "ENGINE_WRITE_DENIED");
        let err = store.set("t", "nope:nope", json!(1)).unwrap_err();
        assert_eq!(err, EngineError::UnknownProperty("nope:nope".into()));
    }

    #[test]
    fn push_then_pop_child() {
        let store = store();
        let sig = store
            .push("t", "interloc:all", "anon", json!({"name": null}))
            .unwrap();
        assert_eq!(sig, "interloc:all:pushed");
        assert_eq!(store.children("interloc:all"), vec!["interloc:all:anon"]);
        assert_eq!(
            store.parent_of("interloc:all:anon").as_deref(),
            Some("interloc:all")
        );

        let again = store.push("t", "interloc:all", "anon", json!(1)).unwrap();
        assert_eq!(again, "interloc:all:anon:changed");

        let popped = store.pop("t", "interloc:all:anon").unwrap();
        assert_eq!(popped.as_deref(), Some("interloc:all:popped"));
        assert!(store.children("interloc:all").is_empty());
        assert_eq!(store.pop("t", "interloc:all:anon").unwrap(), None);
    }

    #[test]
    fn pop_requires_a_child() {
        let store = store();
        let err = store.pop("t", "rawio:out").unwrap_err();
        assert_eq!(err.code(), "ENGINE_NOT_A_CHILD");
    }

    #[test]
    fn push_and_pop_flags_are_enforced() {
        let store = PropertyStore::new();
        store.register(Property::new("m", "fixed").allow_push(false));
        store.register(Property::new("m", "sticky").allow_pop(false));
        assert_eq!(
            store.push("t", "m:fixed", "c", json!(1)).unwrap_err().code(),
            "ENGINE_PUSH_DENIED"
        );
        store.push("t", "m:sticky", "c", json!(1)).unwrap();
        assert_eq!(
            store.pop("t", "m:sticky:c").unwrap_err().code(),
            "ENGINE_POP_DENIED"
        );
    }

    #[test]
    fn snapshot_lists_every_value() {
        let store = store();
        store.push("t", "interloc:all", "anon", json!(true)).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.len(), 4);
        assert_eq!(snap["interloc:all:anon"], json!(true));
    }
}
