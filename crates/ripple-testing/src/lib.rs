//! Testing utilities for Ripple.
//!
//! [`TestHarness`] wraps a [`Context`] and drives it to quiescence after
//! every input, so a test reads as "do X, then check what fired".
//! [`Recorder`] builds actions that only record their calls.
//!
//! ```ignore
//! let recorder = Recorder::new();
//! let mut harness = TestHarness::new().module(
//!     Module::new("m").state(
//!         State::builder("a")
//!             .cond(s("go"))
//!             .action(recorder.action(Outcome::Nothing)),
//!     ),
//! );
//! harness.emit_and_settle("go").await;
//! harness.assert_fired("m:a");
//! assert_eq!(recorder.count("m:a"), 1);
//! ```

use ripple_core::{ActionContext, Context, ContextConfig, Module, Outcome, RoundReport};
use serde_json::Value;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound on wall-clock time for one settle.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// One recorded action call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub state: String,
    pub args: Vec<Value>,
}

/// Shared call log for recording actions.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An action that records the call and returns `outcome`.
    pub fn action(
        &self,
        outcome: Outcome,
    ) -> impl Fn(ActionContext) -> Ready<anyhow::Result<Outcome>> + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        move |ctx: ActionContext| {
            calls.lock().unwrap().push(Call {
                state: ctx.state_name(),
                args: ctx.args().to_vec(),
            });
            ready(Ok(outcome))
        }
    }

    /// An action that records the call and fails.
    pub fn failing(
        &self,
        message: &'static str,
    ) -> impl Fn(ActionContext) -> Ready<anyhow::Result<Outcome>> + Send + Sync + 'static {
        let calls = Arc::clone(&self.calls);
        move |ctx: ActionContext| {
            calls.lock().unwrap().push(Call {
                state: ctx.state_name(),
                args: ctx.args().to_vec(),
            });
            ready(Err(anyhow::anyhow!(message)))
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made by `state` (qualified name).
    pub fn count(&self, state: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.state == state)
            .count()
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// A context plus settle-after-every-input helpers. Failures panic with
/// a descriptive message.
pub struct TestHarness {
    ctx: Context,
    timeout: Duration,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            ctx: Context::with_defaults(),
            timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        let ctx = Context::new(config).unwrap_or_else(|e| panic!("invalid test config: {e}"));
        Self {
            ctx,
            timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }

    pub fn settle_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a module, panicking if registration fails.
    pub fn module(mut self, module: Module) -> Self {
        let name = module.name().to_string();
        if let Err(e) = self.ctx.add_module(module) {
            panic!("failed to register module `{name}`: {e}");
        }
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.ctx
    }

    /// Settle the context, panicking on round limit or timeout.
    pub async fn settle(&mut self) -> Vec<RoundReport> {
        match tokio::time::timeout(self.timeout, self.ctx.settle()).await {
            Ok(Ok(reports)) => reports,
            Ok(Err(e)) => panic!("context did not settle: {e}"),
            Err(_) => panic!("context did not settle within {:?}", self.timeout),
        }
    }

    pub async fn emit_and_settle(&mut self, signal: &str) -> Vec<RoundReport> {
        self.ctx.emit(signal);
        self.settle().await
    }

    pub async fn set_and_settle(
        &mut self,
        property: &str,
        value: impl Into<Value>,
    ) -> Vec<RoundReport> {
        if let Err(e) = self.ctx.set_property(property, value) {
            panic!("failed to set `{property}`: {e}");
        }
        self.settle().await
    }

    pub async fn invoke_and_settle(&mut self, receptor: &str, args: Vec<Value>) -> Vec<RoundReport> {
        if let Err(e) = self.ctx.invoke_receptor(receptor, args) {
            panic!("failed to invoke `{receptor}`: {e}");
        }
        self.settle().await
    }

    /// Qualified names of every state that fired, oldest first.
    pub fn fired_states(&self) -> Vec<String> {
        self.ctx.history().iter().map(|r| r.state.clone()).collect()
    }

    pub fn fired_count(&self, state: &str) -> usize {
        self.ctx
            .history()
            .iter()
            .filter(|r| r.state == state)
            .count()
    }

    /// States that fired in `round`, in firing order.
    pub fn fired_in_round(&self, round: u64) -> Vec<String> {
        self.ctx
            .history()
            .iter()
            .filter(|r| r.round == round)
            .map(|r| r.state.clone())
            .collect()
    }

    pub fn assert_fired(&self, state: &str) {
        assert!(
            self.fired_count(state) > 0,
            "expected `{state}` to fire; fired: {:?}",
            self.fired_states()
        );
    }

    pub fn assert_not_fired(&self, state: &str) {
        assert_eq!(
            self.fired_count(state),
            0,
            "expected `{state}` not to fire; fired: {:?}",
            self.fired_states()
        );
    }

    /// Read a property as the context owner.
    pub fn property(&self, name: &str) -> Value {
        self.ctx
            .get_property(name)
            .unwrap_or_else(|e| panic!("failed to read `{name}`: {e}"))
    }
}
