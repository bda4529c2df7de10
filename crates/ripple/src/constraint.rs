//! Trigger conditions in disjunctive normal form.
//!
//! A [`Constraint`] (also called a [`Disjunct`]) is an OR over
//! [`Conjunct`]s; a conjunct is an AND over [`SignalRef`]s. Constraints are
//! built with `&` and `|` and are normalized as they are built, so the
//! value a state holds is always flat DNF:
//!
//! ```
//! use ripple_core::{s, Constraint};
//!
//! let cond: Constraint = (s("nlp:contains-roboy") & s("nlp:is-question")) | s("idle:bored");
//! assert_eq!(cond.conjuncts().len(), 2);
//! assert_eq!(cond.to_string(), "(nlp:contains-roboy & nlp:is-question) | idle:bored");
//! ```
//!
//! Conjunct order is declaration order and is what makes
//! [`Constraint::evaluate`] deterministic: the first fully satisfiable
//! conjunct wins regardless of the order instances arrived in.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{BitAnd, BitOr};

use crate::signal::{SignalInstance, SignalRef};

/// AND-group of signal references. Holds each signal name at most once.
///
/// Equality ignores declaration order: `a & b` and `b & a` are the same
/// conjunct.
#[derive(Debug, Clone)]
pub struct Conjunct {
    refs: SmallVec<[SignalRef; 4]>,
}

impl Conjunct {
    pub fn new(refs: impl IntoIterator<Item = SignalRef>) -> Self {
        let mut conjunct = Self {
            refs: SmallVec::new(),
        };
        for r in refs {
            conjunct.insert(r);
        }
        conjunct
    }

    fn insert(&mut self, r: SignalRef) {
        // Set semantics by name; the first declaration keeps its weight.
        if !self.refs.iter().any(|existing| existing.name() == r.name()) {
            self.refs.push(r);
        }
    }

    pub fn refs(&self) -> &[SignalRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Sum of the reference weights.
    pub fn specificity(&self) -> f64 {
        self.refs.iter().map(SignalRef::specificity_weight).sum()
    }

    pub fn references(&self, signal: &str) -> bool {
        self.refs.iter().any(|r| r.name() == signal)
    }

    fn sorted_refs(&self) -> SmallVec<[&SignalRef; 4]> {
        let mut refs: SmallVec<[&SignalRef; 4]> = self.refs.iter().collect();
        refs.sort_by(|a, b| a.name().cmp(b.name()));
        refs
    }

    fn merged(&self, other: &Conjunct) -> Conjunct {
        let mut out = self.clone();
        for r in other.refs.iter().cloned() {
            out.insert(r);
        }
        out
    }
}

impl PartialEq for Conjunct {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.sorted_refs() == other.sorted_refs()
    }
}

impl Eq for Conjunct {}

impl Hash for Conjunct {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for r in self.sorted_refs() {
            r.hash(state);
        }
    }
}

impl fmt::Display for Conjunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.refs.iter().map(SignalRef::name).collect();
        f.write_str(&names.join(" & "))
    }
}

/// A complete match of one conjunct.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintMatch {
    /// Index of the satisfied conjunct in declaration order.
    pub conjunct: usize,
    /// One instance per reference of that conjunct, in reference order.
    pub binding: Vec<(SignalRef, SignalInstance)>,
}

impl ConstraintMatch {
    pub fn specificity(&self) -> f64 {
        self.binding
            .iter()
            .map(|(r, _)| r.specificity_weight())
            .sum()
    }
}

/// OR over conjuncts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Constraint {
    conjuncts: Vec<Conjunct>,
}

/// The OR-set of conjuncts; the same thing as a [`Constraint`].
pub type Disjunct = Constraint;

impl Constraint {
    /// Constraint that can never be satisfied.
    pub fn never() -> Self {
        Self::default()
    }

    /// OR over the given conjuncts. Empty and duplicate conjuncts are
    /// dropped.
    pub fn any(conjuncts: impl IntoIterator<Item = Conjunct>) -> Self {
        let mut constraint = Self::default();
        for c in conjuncts {
            constraint.push(c);
        }
        constraint
    }

    fn push(&mut self, conjunct: Conjunct) {
        if !conjunct.is_empty() && !self.conjuncts.contains(&conjunct) {
            self.conjuncts.push(conjunct);
        }
    }

    pub fn conjuncts(&self) -> &[Conjunct] {
        &self.conjuncts
    }

    /// True when no conjunct exists, so nothing can ever satisfy it.
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty()
    }

    /// Every signal name referenced anywhere, deduplicated, in first
    /// occurrence order.
    pub fn signal_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for r in self.conjuncts.iter().flat_map(|c| c.refs()) {
            if !out.contains(&r.name()) {
                out.push(r.name());
            }
        }
        out
    }

    pub fn references(&self, signal: &str) -> bool {
        self.conjuncts.iter().any(|c| c.references(signal))
    }

    /// Find the first conjunct, in declaration order, whose references are
    /// all filled by `available`.
    ///
    /// When several instances of one signal are available the most recent
    /// one fills the slot. Arrival order never changes which conjunct wins.
    pub fn evaluate<'a>(
        &self,
        available: impl IntoIterator<Item = &'a SignalInstance>,
    ) -> Option<ConstraintMatch> {
        let mut newest: HashMap<&str, &SignalInstance> = HashMap::new();
        for inst in available {
            newest
                .entry(inst.name())
                .and_modify(|cur| {
                    if inst.is_newer_than(*cur) {
                        *cur = inst;
                    }
                })
                .or_insert(inst);
        }

        self.conjuncts
            .iter()
            .enumerate()
            .find_map(|(index, conjunct)| {
                let binding = conjunct
                    .refs()
                    .iter()
                    .map(|r| newest.get(r.name()).map(|inst| (r.clone(), (*inst).clone())))
                    .collect::<Option<Vec<_>>>()?;
                Some(ConstraintMatch {
                    conjunct: index,
                    binding,
                })
            })
    }

    fn and(&self, other: &Constraint) -> Constraint {
        Constraint::any(
            self.conjuncts
                .iter()
                .flat_map(|a| other.conjuncts.iter().map(move |b| a.merged(b))),
        )
    }

    fn or(mut self, other: Constraint) -> Constraint {
        for c in other.conjuncts {
            self.push(c);
        }
        self
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conjuncts.is_empty() {
            return f.write_str("<never>");
        }
        let single = self.conjuncts.len() == 1;
        let parts: Vec<String> = self
            .conjuncts
            .iter()
            .map(|c| {
                if c.len() > 1 && !single {
                    format!("({c})")
                } else {
                    c.to_string()
                }
            })
            .collect();
        f.write_str(&parts.join(" | "))
    }
}

impl From<SignalRef> for Conjunct {
    fn from(r: SignalRef) -> Self {
        Conjunct::new([r])
    }
}

impl From<SignalRef> for Constraint {
    fn from(r: SignalRef) -> Self {
        Constraint::any([Conjunct::from(r)])
    }
}

impl From<Conjunct> for Constraint {
    fn from(c: Conjunct) -> Self {
        Constraint::any([c])
    }
}

// AND

impl BitAnd<SignalRef> for SignalRef {
    type Output = Conjunct;

    fn bitand(self, rhs: SignalRef) -> Conjunct {
        Conjunct::new([self, rhs])
    }
}

impl BitAnd<Conjunct> for SignalRef {
    type Output = Conjunct;

    fn bitand(self, rhs: Conjunct) -> Conjunct {
        Conjunct::from(self).merged(&rhs)
    }
}

impl BitAnd<Constraint> for SignalRef {
    type Output = Constraint;

    fn bitand(self, rhs: Constraint) -> Constraint {
        Constraint::from(self).and(&rhs)
    }
}

impl BitAnd<SignalRef> for Conjunct {
    type Output = Conjunct;

    fn bitand(mut self, rhs: SignalRef) -> Conjunct {
        self.insert(rhs);
        self
    }
}

impl BitAnd<Conjunct> for Conjunct {
    type Output = Conjunct;

    fn bitand(self, rhs: Conjunct) -> Conjunct {
        self.merged(&rhs)
    }
}

impl BitAnd<Constraint> for Conjunct {
    type Output = Constraint;

    fn bitand(self, rhs: Constraint) -> Constraint {
        Constraint::from(self).and(&rhs)
    }
}

impl<R: Into<Constraint>> BitAnd<R> for Constraint {
    type Output = Constraint;

    fn bitand(self, rhs: R) -> Constraint {
        self.and(&rhs.into())
    }
}

// OR

impl<R: Into<Constraint>> BitOr<R> for SignalRef {
    type Output = Constraint;

    fn bitor(self, rhs: R) -> Constraint {
        Constraint::from(self).or(rhs.into())
    }
}

impl<R: Into<Constraint>> BitOr<R> for Conjunct {
    type Output = Constraint;

    fn bitor(self, rhs: R) -> Constraint {
        Constraint::from(self).or(rhs.into())
    }
}

impl<R: Into<Constraint>> BitOr<R> for Constraint {
    type Output = Constraint;

    fn bitor(self, rhs: R) -> Constraint {
        self.or(rhs.into())
    }
}
