//! The scheduling loop.
//!
//! A [`Context`] owns the property store, the registered states and an
//! arena of live [`Activation`]s addressed by [`ActivationId`]. It
//! advances in rounds; one call to [`Context::step`] is one round:
//!
//! ```text
//! queued events ──► completions (Delete / Emit, release write locks)
//!       │
//!       ▼
//! retire expired + superseded instances ──► wiped(sig) on every activation
//!       │
//!       ▼
//! one live activation per reachable state
//!       │
//!       ▼
//! offer each new instance to each activation
//!       │
//!       ▼
//! arbitrate Matched activations by write property ──► losers wipe()
//!       │
//!       ▼
//! fire winners (actions run as tokio tasks)
//! ```
//!
//! Signals produced while a round runs, by property writes or by
//! `Outcome::Emit`, only become instances in a later round.
//!
//! # Arbitration
//!
//! Matched activations are visited by specificity (highest first), then
//! by state declaration order, then by activation id. An activation fires
//! unless one of its write properties was already taken this round, in
//! which case it is wiped, or is still held by a running action, in which
//! case it stays Matched and is reconsidered next round. A deferred
//! activation still takes its write properties for the rest of the round.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::action::ActionContext;
use crate::activation::{Activation, ActivationId, ActivationStatus};
use crate::config::ContextConfig;
use crate::error::EngineError;
use crate::module::Module;
use crate::property::{changed_signal, popped_signal, pushed_signal, PropertyStore, POPPED};
use crate::report::{ActivationInfo, FiringRecord, FiringStatus, RoundReport};
use crate::signal::{SignalInstance, NAME_SEPARATOR};
use crate::state::{Outcome, State};

/// Writer name used for property writes made by the context owner.
const OWNER: &str = "context";

/// Handle of a registered state, stable across re-declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateId(pub(crate) usize);

pub(crate) enum ContextEvent {
    Signal(Arc<str>),
    Receptor {
        state: String,
        args: Vec<Value>,
    },
    Completed {
        activation: ActivationId,
        result: anyhow::Result<Outcome>,
    },
}

struct StateSlot {
    state: Arc<State>,
    deleted: bool,
}

struct LiveInstance {
    instance: SignalInstance,
    round: u64,
}

struct Running {
    state_id: StateId,
    state: Arc<State>,
}

/// Cloneable sender into a context, usable while the context is inside
/// [`Context::run`].
#[derive(Clone)]
pub struct ContextHandle {
    events: mpsc::UnboundedSender<ContextEvent>,
}

impl ContextHandle {
    /// Queue a signal for the next round. Returns `false` if the context
    /// is gone.
    pub fn emit(&self, signal: impl Into<String>) -> bool {
        let signal: String = signal.into();
        self.events
            .send(ContextEvent::Signal(signal.as_str().into()))
            .is_ok()
    }

    /// Ask the loop to invoke a receptor. Errors are logged by the loop.
    pub fn invoke_receptor(&self, state: impl Into<String>, args: Vec<Value>) -> bool {
        self.events
            .send(ContextEvent::Receptor {
                state: state.into(),
                args,
            })
            .is_ok()
    }
}

pub struct Context {
    id: Uuid,
    config: ContextConfig,
    /// module name -> dependencies
    modules: BTreeMap<String, Vec<String>>,
    known_signals: HashSet<String>,
    states: Vec<StateSlot>,
    state_index: HashMap<String, StateId>,
    properties: Arc<PropertyStore>,
    activations: BTreeMap<ActivationId, Activation>,
    live_by_state: HashMap<StateId, ActivationId>,
    next_activation: u64,
    instances: HashMap<Arc<str>, LiveInstance>,
    next_seq: u64,
    round: u64,
    running: HashMap<ActivationId, Running>,
    write_locks: HashMap<String, BTreeSet<ActivationId>>,
    events_tx: mpsc::UnboundedSender<ContextEvent>,
    events_rx: mpsc::UnboundedReceiver<ContextEvent>,
    backlog: VecDeque<ContextEvent>,
    history: VecDeque<FiringRecord>,
}

impl Context {
    pub fn new(config: ContextConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    pub fn with_defaults() -> Self {
        Self::build(ContextConfig::default())
    }

    fn build(config: ContextConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        debug!(context = %id, ?config, "context created");
        Self {
            id,
            config,
            modules: BTreeMap::new(),
            known_signals: HashSet::new(),
            states: Vec::new(),
            state_index: HashMap::new(),
            properties: Arc::new(PropertyStore::new()),
            activations: BTreeMap::new(),
            live_by_state: HashMap::new(),
            next_activation: 0,
            instances: HashMap::new(),
            next_seq: 0,
            round: 0,
            running: HashMap::new(),
            write_locks: HashMap::new(),
            events_tx,
            events_rx,
            backlog: VecDeque::new(),
            history: VecDeque::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Number of rounds run so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn properties(&self) -> &Arc<PropertyStore> {
        &self.properties
    }

    pub fn handle(&self) -> ContextHandle {
        ContextHandle {
            events: self.events_tx.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a module with its properties and states.
    ///
    /// Every dependency must already be registered.
    pub fn add_module(&mut self, module: Module) -> Result<Vec<StateId>, EngineError> {
        if self.modules.contains_key(module.name()) {
            return Err(EngineError::DuplicateModule(module.name().to_string()));
        }
        if let Some(missing) = module
            .dependencies()
            .iter()
            .find(|dep| !self.modules.contains_key(dep.as_str()))
        {
            return Err(EngineError::MissingDependency {
                module: module.name().to_string(),
                dependency: missing.clone(),
            });
        }

        let (name, depends, properties, states) = module.into_parts();
        let property_count = properties.len();
        for property in properties {
            self.known_signals.insert(changed_signal(property.name()));
            self.known_signals.insert(pushed_signal(property.name()));
            self.known_signals.insert(popped_signal(property.name()));
            self.properties.register(property);
        }
        for state in &states {
            if let Some(signal) = state.signal() {
                self.known_signals.insert(signal.name().to_string());
            }
        }
        self.modules.insert(name.clone(), depends);

        let ids: Vec<StateId> = states
            .into_iter()
            .map(|state| self.register_state(state))
            .collect();
        info!(
            context = %self.id,
            module = %name,
            properties = property_count,
            states = ids.len(),
            "module registered"
        );
        Ok(ids)
    }

    /// Declare a single state into an already registered module. A state
    /// with the same qualified name is replaced.
    pub fn add_state(&mut self, module: &str, mut state: State) -> Result<StateId, EngineError> {
        if !self.modules.contains_key(module) {
            return Err(EngineError::UnknownModule(module.to_string()));
        }
        state.adopt(module);
        if let Some(signal) = state.signal() {
            self.known_signals.insert(signal.name().to_string());
        }
        Ok(self.register_state(state))
    }

    fn register_state(&mut self, state: State) -> StateId {
        let name = state.qualified_name();
        for signal in state.constraint().signal_names() {
            if !self.known_signals.contains(signal) {
                debug!(state = %name, %signal, "constraint references a signal no module declares yet");
            }
        }
        let state = Arc::new(state);

        match self.state_index.get(&name).copied() {
            Some(id) => {
                self.drop_activations(id);
                self.states[id.0] = StateSlot {
                    state,
                    deleted: false,
                };
                info!(state = %name, "state re-declared; previous declaration replaced");
                id
            }
            None => {
                let id = StateId(self.states.len());
                self.states.push(StateSlot {
                    state,
                    deleted: false,
                });
                self.state_index.insert(name, id);
                id
            }
        }
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.state_index.get(name).copied()
    }

    pub fn state(&self, id: StateId) -> Option<&Arc<State>> {
        self.states.get(id.0).map(|slot| &slot.state)
    }

    /// Whether the state returned `Outcome::Delete`.
    pub fn is_deleted(&self, id: StateId) -> bool {
        self.states.get(id.0).is_some_and(|slot| slot.deleted)
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Queue a signal for the next round.
    pub fn emit(&self, signal: impl Into<String>) {
        let signal: String = signal.into();
        self.queue(ContextEvent::Signal(signal.as_str().into()));
    }

    pub fn get_property(&self, name: &str) -> Result<Value, EngineError> {
        self.properties.get(OWNER, name)
    }

    /// Write a property as the context owner and queue its `changed`
    /// signal.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<(), EngineError> {
        let signal = self.properties.set(OWNER, name, value.into())?;
        self.queue(ContextEvent::Signal(signal.as_str().into()));
        Ok(())
    }

    /// Run a receptor state now, outside of matching. `args` are visible
    /// through [`ActionContext::args`].
    ///
    /// Spawns the action, so it must be called from within a Tokio
    /// runtime; outside of one it fails with [`EngineError::NoRuntime`].
    pub fn invoke_receptor(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<ActivationId, EngineError> {
        let id = self
            .state_id(name)
            .ok_or_else(|| EngineError::UnknownState(name.to_string()))?;
        let slot = self
            .states
            .get(id.0)
            .ok_or_else(|| EngineError::UnknownState(name.to_string()))?;
        if slot.deleted {
            return Err(EngineError::StateDeleted(name.to_string()));
        }
        if !slot.state.is_receptor() {
            return Err(EngineError::NotAReceptor(name.to_string()));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(EngineError::NoRuntime(name.to_string()));
        }
        let state = Arc::clone(&slot.state);
        let activation = self.allocate_id();
        debug!(state = %name, %activation, args = args.len(), "receptor invoked");
        self.launch(activation, id, state, args, 0.0, Vec::new());
        Ok(activation)
    }

    fn queue(&self, event: ContextEvent) {
        // The receiver lives in `self`, so the send cannot fail here.
        let _ = self.events_tx.send(event);
    }

    // ------------------------------------------------------------------
    // Rounds
    // ------------------------------------------------------------------

    /// Run one matching round.
    pub async fn step(&mut self) -> RoundReport {
        self.round += 1;
        let round = self.round;
        let mut report = RoundReport::new(round);

        let mut arrivals: Vec<Arc<str>> = Vec::new();
        while let Some(event) = self.next_event() {
            match event {
                ContextEvent::Signal(name) => arrivals.push(name),
                ContextEvent::Receptor { state, args } => {
                    if let Err(err) = self.invoke_receptor(&state, args) {
                        warn!(%state, error = %err, code = err.code(), "queued receptor call rejected");
                    }
                }
                ContextEvent::Completed { activation, result } => {
                    self.complete(activation, result, &mut arrivals, &mut report);
                }
            }
        }

        self.expire(round, &mut report);
        let fresh = self.admit(arrivals, round, &mut report);
        self.ensure_activations();

        for instance in &fresh {
            for activation in self.activations.values_mut() {
                if activation.offer(instance) {
                    debug!(
                        state = %activation.name(),
                        signal = %instance,
                        status = ?activation.status(),
                        "instance bound"
                    );
                }
            }
        }

        self.arbitrate(&mut report);

        if !report.is_quiet() {
            debug!(
                round,
                fired = ?report.fired,
                wiped = ?report.wiped,
                deferred = ?report.deferred,
                "round complete"
            );
        }

        // Spawned actions only progress on a current-thread runtime when
        // the loop yields.
        tokio::task::yield_now().await;
        report
    }

    /// Step until no event is queued and no action is running.
    ///
    /// While only running actions remain, waits for the next of them to
    /// report back. Fails after `max_settle_rounds` rounds.
    pub async fn settle(&mut self) -> Result<Vec<RoundReport>, EngineError> {
        let limit = self.config.max_settle_rounds;
        let mut reports = Vec::new();
        while !self.is_idle() {
            if reports.len() as u64 >= limit {
                warn!(context = %self.id, limit, running = self.running.len(), "context did not settle");
                return Err(EngineError::RoundLimitExceeded(limit));
            }
            if !self.has_queued_events() {
                match self.events_rx.recv().await {
                    Some(event) => self.backlog.push_back(event),
                    None => break,
                }
            }
            reports.push(self.step().await);
        }
        Ok(reports)
    }

    /// Drive rounds until `shutdown` resolves, waking on queued events and
    /// on every tick.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(context = %self.id, tick_ms = self.config.tick_interval_ms, "context loop started");

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = self.events_rx.recv() => event,
                _ = ticker.tick() => None,
            };
            if let Some(event) = event {
                self.backlog.push_back(event);
            }
            self.step().await;
        }

        info!(context = %self.id, rounds = self.round, "context loop stopped");
    }

    /// No queued event and no running action.
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && !self.has_queued_events()
    }

    fn has_queued_events(&self) -> bool {
        !self.backlog.is_empty() || !self.events_rx.is_empty()
    }

    fn next_event(&mut self) -> Option<ContextEvent> {
        self.backlog
            .pop_front()
            .or_else(|| self.events_rx.try_recv().ok())
    }

    fn allocate_id(&mut self) -> ActivationId {
        let id = ActivationId(self.next_activation);
        self.next_activation += 1;
        id
    }

    /// Turn queued signal names into instances. An older live instance of
    /// the same signal is retired; instances superseded within this round
    /// are never offered.
    fn admit(
        &mut self,
        arrivals: Vec<Arc<str>>,
        round: u64,
        report: &mut RoundReport,
    ) -> Vec<SignalInstance> {
        let mut fresh = Vec::with_capacity(arrivals.len());
        for name in arrivals {
            let instance = SignalInstance::new(Arc::clone(&name), self.next_seq);
            self.next_seq += 1;
            report.new_instances += 1;
            let previous = self.instances.insert(
                name,
                LiveInstance {
                    instance: instance.clone(),
                    round,
                },
            );
            if let Some(previous) = previous {
                self.retire(&previous.instance, report);
            }
            let popped = format!("{NAME_SEPARATOR}{POPPED}");
            if let Some(parent) = instance.name().strip_suffix(popped.as_str()) {
                self.retire_orphans(parent, report);
            }
            fresh.push(instance);
        }
        fresh.retain(|instance| {
            self.instances
                .get(instance.name())
                .is_some_and(|live| live.instance == *instance)
        });
        fresh
    }

    fn expire(&mut self, round: u64, report: &mut RoundReport) {
        let Some(ttl) = self.config.instance_ttl_rounds else {
            return;
        };
        let mut expired: Vec<SignalInstance> = self
            .instances
            .values()
            .filter(|live| round.saturating_sub(live.round) >= ttl)
            .map(|live| live.instance.clone())
            .collect();
        expired.sort();
        for instance in expired {
            self.instances.remove(instance.name());
            debug!(signal = %instance, ttl, "instance expired");
            self.retire(&instance, report);
        }
    }

    /// Drop live instances of child properties of `parent` that are no
    /// longer in the store.
    fn retire_orphans(&mut self, parent: &str, report: &mut RoundReport) {
        let prefix = format!("{parent}{NAME_SEPARATOR}");
        let mut orphans: Vec<SignalInstance> = self
            .instances
            .values()
            .filter(|live| {
                live.instance
                    .name()
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.rsplit_once(NAME_SEPARATOR))
                    .is_some_and(|(child, _)| {
                        !self.properties.contains(&format!("{prefix}{child}"))
                    })
            })
            .map(|live| live.instance.clone())
            .collect();
        orphans.sort();
        for instance in orphans {
            self.instances.remove(instance.name());
            debug!(signal = %instance, %parent, "child property gone; instance retired");
            self.retire(&instance, report);
        }
    }

    /// Wipe every binding that uses `instance`.
    fn retire(&mut self, instance: &SignalInstance, report: &mut RoundReport) {
        report.retired += 1;
        for activation in self.activations.values_mut() {
            if activation.uses(instance) {
                activation.wiped(instance);
                debug!(
                    state = %activation.name(),
                    signal = %instance,
                    status = ?activation.status(),
                    "binding wiped"
                );
            }
        }
    }

    fn ensure_activations(&mut self) {
        for (index, slot) in self.states.iter().enumerate() {
            let state_id = StateId(index);
            if slot.deleted
                || !slot.state.is_reachable()
                || self.live_by_state.contains_key(&state_id)
            {
                continue;
            }
            let id = ActivationId(self.next_activation);
            self.next_activation += 1;
            self.activations
                .insert(id, Activation::new(id, state_id, Arc::clone(&slot.state)));
            self.live_by_state.insert(state_id, id);
        }
    }

    fn arbitrate(&mut self, report: &mut RoundReport) {
        let mut candidates: Vec<(f64, StateId, ActivationId)> = self
            .activations
            .values()
            .filter(|a| a.status() == ActivationStatus::Matched)
            .map(|a| (a.specificity(), a.state_id(), a.id()))
            .collect();
        candidates.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        let mut taken: HashMap<String, ActivationId> = HashMap::new();
        let mut winners = Vec::new();
        for (specificity, _, id) in candidates {
            let Some(activation) = self.activations.get(&id) else {
                continue;
            };
            let name = activation.name();
            let conflict = activation
                .claims()
                .iter()
                .find_map(|p| taken.get(p).map(|winner| (p.clone(), *winner)));
            let busy = activation
                .claims()
                .iter()
                .find(|p| self.write_locks.get(p.as_str()).is_some_and(|h| !h.is_empty()))
                .cloned();
            let claims: Vec<String> = activation.claims().iter().cloned().collect();

            if let Some((property, winner)) = conflict {
                debug!(state = %name, %property, %winner, specificity, "lost write arbitration");
                self.discard(id);
                report.wiped.push(name);
            } else {
                // A deferred writer keeps its claims, so lower-ranked
                // rivals lose to it as they would to a winner.
                for property in claims {
                    taken.insert(property, id);
                }
                if let Some(property) = busy {
                    debug!(state = %name, %property, "write property busy; deferred");
                    report.deferred.push(name);
                } else {
                    winners.push(id);
                }
            }
        }

        for id in winners {
            self.fire(id, report);
        }
    }

    /// Remove an activation from the arena and wipe it.
    fn discard(&mut self, id: ActivationId) {
        if let Some(mut activation) = self.activations.remove(&id) {
            activation.wipe();
            if self.live_by_state.get(&activation.state_id()) == Some(&id) {
                self.live_by_state.remove(&activation.state_id());
            }
        }
    }

    fn drop_activations(&mut self, state_id: StateId) {
        let doomed: Vec<ActivationId> = self
            .activations
            .values()
            .filter(|a| a.state_id() == state_id)
            .map(Activation::id)
            .collect();
        for id in doomed {
            self.discard(id);
        }
        self.live_by_state.remove(&state_id);
    }

    fn fire(&mut self, id: ActivationId, report: &mut RoundReport) {
        let Some(mut activation) = self.activations.remove(&id) else {
            return;
        };
        self.live_by_state.remove(&activation.state_id());
        let specificity = activation.specificity();
        let Some(bound) = activation.fire() else {
            return;
        };
        let state = Arc::clone(activation.state());
        let name = state.qualified_name();
        let signals: Vec<String> = bound.iter().map(|i| i.name().to_string()).collect();
        debug!(state = %name, activation = %id, specificity, ?signals, "firing");
        self.launch(id, activation.state_id(), state, Vec::new(), specificity, signals);
        report.fired.push(name);
    }

    /// Spawn the action, lock its write properties until it reports back.
    fn launch(
        &mut self,
        id: ActivationId,
        state_id: StateId,
        state: Arc<State>,
        args: Vec<Value>,
        specificity: f64,
        signals: Vec<String>,
    ) {
        for property in state.write_props() {
            self.write_locks
                .entry(property.clone())
                .or_default()
                .insert(id);
        }
        self.running.insert(
            id,
            Running {
                state_id,
                state: Arc::clone(&state),
            },
        );
        self.record(FiringRecord {
            activation: id,
            round: self.round,
            state: state.qualified_name(),
            specificity,
            signals,
            fired_at: chrono::Utc::now(),
            status: FiringStatus::Running,
        });

        let ctx = ActionContext::new(
            Arc::clone(&state),
            Arc::clone(&self.properties),
            self.events_tx.clone(),
            args,
        );
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(state.invoke(ctx)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!(
                    "action panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            if events
                .send(ContextEvent::Completed {
                    activation: id,
                    result,
                })
                .is_err()
            {
                debug!(activation = %id, "context gone before the action finished");
            }
        });
    }

    fn complete(
        &mut self,
        id: ActivationId,
        result: anyhow::Result<Outcome>,
        arrivals: &mut Vec<Arc<str>>,
        report: &mut RoundReport,
    ) {
        let Some(running) = self.running.remove(&id) else {
            warn!(activation = %id, "completion for an unknown activation");
            return;
        };
        for property in running.state.write_props() {
            if let Some(holders) = self.write_locks.get_mut(property) {
                holders.remove(&id);
                if holders.is_empty() {
                    self.write_locks.remove(property);
                }
            }
        }

        let name = running.state.qualified_name();
        let status = match result {
            Ok(outcome) => {
                self.apply(outcome, &running, arrivals, report);
                FiringStatus::Finished(outcome)
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(state = %name, activation = %id, error = %message, "action failed");
                FiringStatus::Failed(message)
            }
        };
        if let Some(record) = self.history.iter_mut().rev().find(|r| r.activation == id) {
            record.status = status;
        }
        report.completed.push(name);
    }

    fn apply(
        &mut self,
        outcome: Outcome,
        running: &Running,
        arrivals: &mut Vec<Arc<str>>,
        report: &mut RoundReport,
    ) {
        match outcome {
            Outcome::Nothing => {}
            Outcome::Emit => match running.state.signal() {
                Some(signal) => arrivals.push(signal.name().into()),
                None => warn!(
                    state = %running.state.qualified_name(),
                    "state returned Emit but declares no signal; ignored"
                ),
            },
            Outcome::Delete => self.delete(running, report),
        }
    }

    fn delete(&mut self, running: &Running, report: &mut RoundReport) {
        let name = running.state.qualified_name();
        let Some(slot) = self.states.get_mut(running.state_id.0) else {
            return;
        };
        if !Arc::ptr_eq(&slot.state, &running.state) {
            debug!(state = %name, "state was re-declared while running; delete ignored");
            return;
        }
        slot.deleted = true;
        self.drop_activations(running.state_id);
        info!(state = %name, "state deleted");
        report.deleted.push(name);
    }

    fn record(&mut self, record: FiringRecord) {
        let limit = self.config.history_limit;
        if limit == 0 {
            return;
        }
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(record);
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Retained firing records, oldest first.
    pub fn history(&self) -> &VecDeque<FiringRecord> {
        &self.history
    }

    pub fn activation(&self, id: ActivationId) -> Option<&Activation> {
        self.activations.get(&id)
    }

    /// Live (Pending or Matched) activations, by id.
    pub fn activations(&self) -> Vec<ActivationInfo> {
        self.activations
            .values()
            .map(|a| ActivationInfo {
                id: a.id(),
                state: a.name(),
                status: a.status(),
                specificity: a.specificity(),
                signals: a
                    .signal_instances()
                    .iter()
                    .map(|i| i.name().to_string())
                    .collect(),
                claims: a.claims().iter().cloned().collect(),
            })
            .collect()
    }

    /// Current live instances, oldest first.
    pub fn live_instances(&self) -> Vec<SignalInstance> {
        let mut out: Vec<_> = self
            .instances
            .values()
            .map(|live| live.instance.clone())
            .collect();
        out.sort();
        out
    }

    /// Number of actions that have not reported back.
    pub fn running(&self) -> usize {
        self.running.len()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("round", &self.round)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("states", &self.states.len())
            .field("activations", &self.activations.len())
            .field("running", &self.running.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
