//! Per-state activation tracking.
//!
//! An [`Activation`] follows one state toward firing. It keeps one slot
//! per signal reference of every conjunct of the state's constraint and
//! fills slots as instances are offered.
//!
//! ```text
//!            offer (conjunct complete)
//!  Pending ──────────────────────────► Matched ──── fire ───► Fired
//!     ▲                                  │  │
//!     └──── wiped(sig) on the satisfied ─┘  │
//!           conjunct                        │
//!  Pending / Matched ──── wipe() ───────────┴───────────────► Wiped
//! ```
//!
//! While Matched, the activation holds a claim on every property its
//! state writes. Claims are dropped synchronously by `fire`, `wipe` and
//! by a `wiped` that breaks the satisfied conjunct.
//!
//! Specificity is the sum of the reference weights of the satisfied
//! conjunct, or `0.0` while Pending.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::context::StateId;
use crate::signal::SignalInstance;
use crate::state::State;

/// Stable handle of an activation within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationId(pub(crate) u64);

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "act-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationStatus {
    /// No conjunct is completely bound.
    Pending,
    /// A conjunct is completely bound; write claims are held.
    Matched,
    /// The action was started. Terminal.
    Fired,
    /// Invalidated. Terminal.
    Wiped,
}

impl ActivationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fired | Self::Wiped)
    }
}

pub struct Activation {
    id: ActivationId,
    state_id: StateId,
    state: Arc<State>,
    /// `slots[c][r]` holds the instance bound to reference `r` of
    /// conjunct `c`.
    slots: Vec<Vec<Option<SignalInstance>>>,
    satisfied: Option<usize>,
    specificity: f64,
    claims: BTreeSet<String>,
    status: ActivationStatus,
}

impl Activation {
    pub fn new(id: ActivationId, state_id: StateId, state: Arc<State>) -> Self {
        let slots = state
            .constraint()
            .conjuncts()
            .iter()
            .map(|c| vec![None; c.len()])
            .collect();
        Self {
            id,
            state_id,
            state,
            slots,
            satisfied: None,
            specificity: 0.0,
            claims: BTreeSet::new(),
            status: ActivationStatus::Pending,
        }
    }

    pub fn id(&self) -> ActivationId {
        self.id
    }

    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    /// Qualified name of the state.
    pub fn name(&self) -> String {
        self.state.qualified_name()
    }

    pub fn status(&self) -> ActivationStatus {
        self.status
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Index of the completely bound conjunct.
    pub fn satisfied_conjunct(&self) -> Option<usize> {
        self.satisfied
    }

    /// Bind `instance` into every slot that references its signal and is
    /// empty or holds an older instance.
    ///
    /// Returns whether any binding changed. Offering an instance that is
    /// already bound, or older than the bound one, changes nothing.
    pub fn offer(&mut self, instance: &SignalInstance) -> bool {
        if !self.is_live() {
            return false;
        }
        let mut changed = false;
        for (conjunct, slots) in self
            .state
            .constraint()
            .conjuncts()
            .iter()
            .zip(self.slots.iter_mut())
        {
            for (r, slot) in conjunct.refs().iter().zip(slots.iter_mut()) {
                if !r.accepts(instance) {
                    continue;
                }
                let replace = match slot {
                    Some(bound) => instance.is_newer_than(bound),
                    None => true,
                };
                if replace {
                    *slot = Some(instance.clone());
                    changed = true;
                }
            }
        }
        if changed {
            self.refresh();
        }
        changed
    }

    /// Current specificity; `0.0` unless Matched.
    pub fn specificity(&self) -> f64 {
        self.specificity
    }

    /// Properties the state would write if this activation fires.
    pub fn write_props(&self) -> &[String] {
        self.state.write_props()
    }

    /// Write claims currently held.
    pub fn claims(&self) -> &BTreeSet<String> {
        &self.claims
    }

    /// Drop every binding that uses `sig`.
    ///
    /// If the satisfied conjunct loses a binding the claims are released
    /// and the activation falls back to Pending, unless another conjunct
    /// is still completely bound.
    pub fn wiped(&mut self, sig: &SignalInstance) {
        if !self.is_live() {
            return;
        }
        let mut hit = false;
        for slot in self.slots.iter_mut().flatten() {
            if slot.as_ref() == Some(sig) {
                *slot = None;
                hit = true;
            }
        }
        if hit {
            self.refresh();
        }
    }

    /// Drop all bindings and claims. Terminal.
    pub fn wipe(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            *slot = None;
        }
        self.satisfied = None;
        self.specificity = 0.0;
        self.claims.clear();
        self.status = ActivationStatus::Wiped;
    }

    /// Every bound instance.
    pub fn signal_instances(&self) -> BTreeSet<SignalInstance> {
        self.slots.iter().flatten().flatten().cloned().collect()
    }

    /// Whether any slot holds `sig`.
    pub fn uses(&self, sig: &SignalInstance) -> bool {
        self.slots.iter().flatten().flatten().any(|bound| bound == sig)
    }

    /// Matched -> Fired. Releases the claims and returns the instances of
    /// the satisfied conjunct, or `None` if the activation was not Matched.
    pub(crate) fn fire(&mut self) -> Option<Vec<SignalInstance>> {
        if self.status != ActivationStatus::Matched {
            return None;
        }
        let bound = self
            .satisfied
            .and_then(|c| self.slots.get(c))
            .map(|slots| slots.iter().flatten().cloned().collect())
            .unwrap_or_default();
        self.claims.clear();
        self.status = ActivationStatus::Fired;
        Some(bound)
    }

    fn refresh(&mut self) {
        let satisfied = self
            .slots
            .iter()
            .position(|slots| slots.iter().all(Option::is_some));
        self.satisfied = satisfied;
        match satisfied {
            Some(index) => {
                self.specificity = self.state.constraint().conjuncts()[index].specificity();
                self.claims = self.state.write_props().iter().cloned().collect();
                self.status = ActivationStatus::Matched;
            }
            None => {
                self.specificity = 0.0;
                self.claims.clear();
                self.status = ActivationStatus::Pending;
            }
        }
    }
}

impl fmt::Debug for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activation")
            .field("id", &self.id)
            .field("state", &self.name())
            .field("status", &self.status)
            .field("specificity", &self.specificity)
            .field("claims", &self.claims)
            .finish()
    }
}
