//! States: declarative behavior units.
//!
//! A state names the properties it reads and writes, the constraint that
//! wakes it, and the action to run. It is built once with
//! [`State::builder`] and never mutated afterwards; re-declaring a state
//! replaces it.
//!
//! ```
//! use ripple_core::{s, ActionContext, Outcome, State};
//!
//! let greeting = State::builder("greeting")
//!     .read("interloc:all")
//!     .write("rawio:out")
//!     .cond(s("interloc:all:pushed"))
//!     .action(|ctx: ActionContext| async move {
//!         ctx.set("rawio:out", "Hello!")?;
//!         Outcome::done()
//!     });
//! assert_eq!(greeting.constraint().to_string(), "interloc:all:pushed");
//! ```
//!
//! Without an explicit condition the constraint is derived from the read
//! properties: the state wakes when *any one* of them changes.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::action::ActionContext;
use crate::constraint::{Conjunct, Constraint};
use crate::property::changed_signal;
use crate::signal::{qualify, Signal, SignalRef};

/// What an action asks the context to do after it ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Nothing beyond the properties the action wrote.
    #[default]
    Nothing,
    /// Deregister the state; no new activation is ever created for it.
    Delete,
    /// Publish the state's own signal in the next round.
    Emit,
}

impl Outcome {
    /// `Ok(Outcome::Nothing)`, for the tail of an action.
    pub fn done() -> anyhow::Result<Outcome> {
        Ok(Outcome::Nothing)
    }

    /// `Ok(Outcome::Emit)`
    pub fn emit() -> anyhow::Result<Outcome> {
        Ok(Outcome::Emit)
    }

    /// `Ok(Outcome::Delete)`
    pub fn delete() -> anyhow::Result<Outcome> {
        Ok(Outcome::Delete)
    }
}

/// The executable part of a state.
///
/// Closures `Fn(ActionContext) -> impl Future<Output = anyhow::Result<Outcome>>`
/// implement this automatically.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    async fn run(&self, ctx: ActionContext) -> anyhow::Result<Outcome>;
}

#[async_trait]
impl<F, Fut> Action for F
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
{
    async fn run(&self, ctx: ActionContext) -> anyhow::Result<Outcome> {
        (self)(ctx).await
    }
}

/// Immutable state descriptor.
pub struct State {
    name: String,
    module_name: Option<String>,
    signal: Option<String>,
    write_props: Vec<String>,
    read_props: Vec<String>,
    constraint: Constraint,
    derived: bool,
    is_receptor: bool,
    action: Arc<dyn Action>,
}

impl State {
    pub fn builder(name: impl Into<String>) -> StateBuilder {
        StateBuilder {
            name: name.into(),
            signal: None,
            write: Vec::new(),
            read: Vec::new(),
            cond: None,
            is_receptor: false,
        }
    }

    /// Local name, without the module qualifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `module:name` once the state belongs to a module.
    pub fn qualified_name(&self) -> String {
        match &self.module_name {
            Some(module) => qualify(module, &self.name),
            None => self.name.clone(),
        }
    }

    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    /// The signal this state may emit, qualified as `module:signal`.
    /// `None` if the state declares no signal or has no module yet.
    pub fn signal(&self) -> Option<Signal> {
        let module = self.module_name.as_deref()?;
        let local = self.signal.as_deref()?;
        Some(Signal::qualified(module, local))
    }

    pub fn write_props(&self) -> &[String] {
        &self.write_props
    }

    pub fn read_props(&self) -> &[String] {
        &self.read_props
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    /// Whether the constraint was derived from the read properties.
    pub fn is_derived(&self) -> bool {
        self.derived
    }

    pub fn is_receptor(&self) -> bool {
        self.is_receptor
    }

    /// False when nothing can ever satisfy the constraint.
    pub fn is_reachable(&self) -> bool {
        !self.constraint.is_empty()
    }

    pub fn reads(&self, property: &str) -> bool {
        self.read_props.iter().any(|p| p == property)
    }

    pub fn writes(&self, property: &str) -> bool {
        self.write_props.iter().any(|p| p == property)
    }

    /// Run the action. The result is returned unmodified.
    pub fn invoke(&self, ctx: ActionContext) -> BoxFuture<'static, anyhow::Result<Outcome>> {
        let action = Arc::clone(&self.action);
        Box::pin(async move { action.run(ctx).await })
    }

    pub(crate) fn adopt(&mut self, module: &str) {
        self.module_name = Some(module.to_string());
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.qualified_name())
            .field("read", &self.read_props)
            .field("write", &self.write_props)
            .field("constraint", &self.constraint.to_string())
            .field("signal", &self.signal)
            .field("receptor", &self.is_receptor)
            .finish()
    }
}

/// Builder for [`State`]; finish with [`action`](Self::action) or
/// [`handler`](Self::handler).
#[derive(Debug, Clone)]
pub struct StateBuilder {
    name: String,
    signal: Option<String>,
    write: Vec<String>,
    read: Vec<String>,
    cond: Option<Constraint>,
    is_receptor: bool,
}

impl StateBuilder {
    /// Local name of the signal the state may emit.
    pub fn signal(mut self, name: impl Into<String>) -> Self {
        self.signal = Some(name.into());
        self
    }

    pub fn write(mut self, property: impl AsRef<str>) -> Self {
        push_unique(&mut self.write, property.as_ref());
        self
    }

    pub fn read(mut self, property: impl AsRef<str>) -> Self {
        push_unique(&mut self.read, property.as_ref());
        self
    }

    pub fn cond(mut self, cond: impl Into<Constraint>) -> Self {
        self.cond = Some(cond.into());
        self
    }

    /// Mark the state as triggered manually through
    /// [`Context::invoke_receptor`](crate::Context::invoke_receptor).
    pub fn receptor(mut self) -> Self {
        self.is_receptor = true;
        self
    }

    pub fn action<F, Fut>(self, action: F) -> State
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
    {
        self.handler(action)
    }

    pub fn handler(self, action: impl Action) -> State {
        let explicit = self.cond.filter(|c| !c.is_empty());
        let derived = explicit.is_none() && !self.read.is_empty();
        let constraint = match explicit {
            Some(cond) => cond,
            None => derive_constraint(&self.read),
        };

        if constraint.is_empty() && !self.is_receptor {
            tracing::warn!(
                state = %self.name,
                "state reads no properties and waits for no signals; it will never be activated"
            );
        }

        State {
            name: self.name,
            module_name: None,
            signal: self.signal,
            write_props: self.write,
            read_props: self.read,
            constraint,
            derived,
            is_receptor: self.is_receptor,
            action: Arc::new(action),
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// One single-reference conjunct on `<p>:changed` per read property `p`,
/// OR'd together.
pub fn derive_constraint(read_props: &[String]) -> Constraint {
    Constraint::any(
        read_props
            .iter()
            .map(|p| Conjunct::from(SignalRef::new(changed_signal(p)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::s;
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    fn noop(builder: StateBuilder) -> State {
        builder.action(|_ctx: ActionContext| async { Outcome::done() })
    }

    #[test]
    fn derived_constraint_is_one_conjunct_per_read_property() {
        let state = noop(State::builder("parse").read("rawio:in").read("interloc:all"));
        assert!(state.is_derived());
        let conjuncts = state.constraint().conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].refs().len(), 1);
        assert_eq!(conjuncts[0].refs()[0].name(), "rawio:in:changed");
        assert_eq!(conjuncts[1].refs()[0].name(), "interloc:all:changed");
    }

    #[test]
    fn explicit_condition_wins_over_derivation() {
        let state = noop(
            State::builder("funboy")
                .read("nlp:triples")
                .cond(s("nlp:contains-roboy") & s("nlp:is-question")),
        );
        assert!(!state.is_derived());
        assert_eq!(state.constraint().conjuncts().len(), 1);
        assert!(!state.constraint().references("nlp:triples:changed"));
    }

    #[test]
    fn state_without_trigger_is_unreachable() {
        let state = noop(State::builder("lonely").write("rawio:out"));
        assert!(!state.is_reachable());

        let receptor = noop(State::builder("input").write("rawio:in").receptor());
        assert!(receptor.is_receptor());
        assert!(!receptor.is_reachable());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn logged(build: impl FnOnce() -> State) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            build();
        });
        captured.contents()
    }

    #[test]
    fn unreachable_state_is_reported_at_build_time() {
        let out = logged(|| noop(State::builder("lonely").write("rawio:out")));
        assert!(out.contains("WARN"), "{out}");
        assert!(out.contains("lonely"), "{out}");
        assert!(out.contains("never be activated"), "{out}");

        let out = logged(|| noop(State::builder("input").write("rawio:in").receptor()));
        assert!(out.is_empty(), "{out}");

        let out = logged(|| noop(State::builder("echo").read("rawio:in")));
        assert!(out.is_empty(), "{out}");
    }

    #[test]
    fn signal_is_qualified_by_module() {
        let mut state = noop(State::builder("detect").signal("is-question"));
        assert_eq!(state.signal(), None);
        state.adopt("nlp");
        assert_eq!(state.signal().map(|s| s.name().to_string()).as_deref(), Some("nlp:is-question"));
        assert_eq!(state.qualified_name(), "nlp:detect");
    }

    #[test]
    fn property_lists_are_deduplicated_in_order() {
        let state = noop(
            State::builder("x")
                .write("a:b")
                .write("a:c")
                .write("a:b")
                .read("a:b"),
        );
        assert_eq!(state.write_props(), ["a:b", "a:c"]);
        assert!(state.reads("a:b"));
        assert!(!state.writes("a:d"));
    }
}
