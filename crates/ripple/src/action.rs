//! The context handed to a running action.
//!
//! An [`ActionContext`] is owned by the action's task, so it holds only
//! shared handles: the property store, the state descriptor and the queue
//! back into the scheduling loop. Every access is checked against the
//! state's declared read and write properties. Signals produced by writes
//! are queued and become visible to matching in the next round.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::context::ContextEvent;
use crate::error::EngineError;
use crate::property::PropertyStore;
use crate::state::State;

#[derive(Clone)]
pub struct ActionContext {
    state: Arc<State>,
    properties: Arc<PropertyStore>,
    events: mpsc::UnboundedSender<ContextEvent>,
    args: Arc<[Value]>,
}

impl ActionContext {
    pub(crate) fn new(
        state: Arc<State>,
        properties: Arc<PropertyStore>,
        events: mpsc::UnboundedSender<ContextEvent>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            state,
            properties,
            events,
            args: args.into(),
        }
    }

    /// Qualified name of the running state.
    pub fn state_name(&self) -> String {
        self.state.qualified_name()
    }

    /// Arguments passed to a receptor invocation; empty for states fired
    /// by matching.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn get(&self, property: &str) -> Result<Value, EngineError> {
        if !self.may(property, State::reads) {
            return Err(EngineError::ReadDenied {
                state: self.state_name(),
                property: property.to_string(),
            });
        }
        self.properties.get(&self.state_name(), property)
    }

    /// Set a property and queue its `changed` signal.
    pub fn set(&self, property: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        if !self.may(property, State::writes) {
            return Err(EngineError::WriteDenied {
                state: self.state_name(),
                property: property.to_string(),
            });
        }
        let signal = self
            .properties
            .set(&self.state_name(), property, value.into())?;
        self.queue(signal);
        Ok(())
    }

    /// Push child `child` onto `parent` and queue `<parent>:pushed`.
    pub fn push(
        &self,
        parent: &str,
        child: &str,
        value: impl Into<Value>,
    ) -> Result<(), EngineError> {
        if !self.may(parent, State::writes) {
            return Err(EngineError::WriteDenied {
                state: self.state_name(),
                property: parent.to_string(),
            });
        }
        let signal = self
            .properties
            .push(&self.state_name(), parent, child, value.into())?;
        self.queue(signal);
        Ok(())
    }

    /// Pop a child property and queue `<parent>:popped`. Returns `false`
    /// when the child did not exist.
    pub fn pop(&self, child: &str) -> Result<bool, EngineError> {
        if !self.properties.contains(child) {
            return Ok(false);
        }
        let parent = self
            .properties
            .parent_of(child)
            .ok_or_else(|| EngineError::NotAChild(child.to_string()))?;
        if !self.may(&parent, State::writes) {
            return Err(EngineError::WriteDenied {
                state: self.state_name(),
                property: parent,
            });
        }
        match self.properties.pop(&self.state_name(), child)? {
            Some(signal) => {
                self.queue(signal);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Qualified names of the children of a readable property.
    pub fn children(&self, parent: &str) -> Result<Vec<String>, EngineError> {
        if !self.may(parent, State::reads) {
            return Err(EngineError::ReadDenied {
                state: self.state_name(),
                property: parent.to_string(),
            });
        }
        Ok(self.properties.children(parent))
    }

    /// The property itself or one of its ancestors is declared.
    fn may(&self, property: &str, declared: fn(&State, &str) -> bool) -> bool {
        let mut current = Some(property.to_string());
        while let Some(name) = current {
            if declared(&self.state, &name) {
                return true;
            }
            current = self.properties.parent_of(&name);
        }
        false
    }

    fn queue(&self, signal: String) {
        if self
            .events
            .send(ContextEvent::Signal(signal.as_str().into()))
            .is_err()
        {
            tracing::debug!(state = %self.state_name(), %signal, "context gone, signal dropped");
        }
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("state", &self.state_name())
            .field("args", &self.args)
            .finish()
    }
}
