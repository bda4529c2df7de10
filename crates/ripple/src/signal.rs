//! Signals, signal references and signal instances.
//!
//! - [`Signal`] is a named category of event, qualified as `module:name`.
//! - [`SignalRef`] is a slot inside a [`Conjunct`](crate::Conjunct) that
//!   some instance of the named signal has to fill.
//! - [`SignalInstance`] is one occurrence of a signal at runtime. Its
//!   identity is the signal name plus the arrival sequence number handed
//!   out by the context; the timestamp is diagnostic only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Separator between the parts of a qualified name.
pub const NAME_SEPARATOR: char = ':';

/// Join a module name and a local name into a qualified name.
pub fn qualify(module: &str, name: &str) -> String {
    format!("{module}{NAME_SEPARATOR}{name}")
}

/// A named category of event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signal {
    name: String,
}

impl Signal {
    /// Signal with an already qualified name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Signal `module:name`.
    pub fn qualified(module: &str, name: &str) -> Self {
        Self::new(qualify(module, name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference to this signal with the default weight.
    pub fn to_ref(&self) -> SignalRef {
        SignalRef::new(self.name.clone())
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Reference to a signal inside a constraint.
///
/// The weight is this reference's contribution to the specificity of an
/// activation whose satisfied conjunct contains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRef {
    name: String,
    weight: f64,
}

impl SignalRef {
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: Self::DEFAULT_WEIGHT,
        }
    }

    /// Override the specificity weight. Negative or non-finite weights
    /// are clamped to zero so specificity never decreases as slots fill.
    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn specificity_weight(&self) -> f64 {
        self.weight
    }

    /// Whether `instance` is an occurrence of the referenced signal.
    pub fn accepts(&self, instance: &SignalInstance) -> bool {
        instance.name() == self.name
    }
}

impl PartialEq for SignalRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.weight.to_bits() == other.weight.to_bits()
    }
}

impl Eq for SignalRef {}

impl Hash for SignalRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.weight.to_bits().hash(state);
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// `s("nlp:is-question")`-style shorthand for a signal reference.
pub fn s(name: impl Into<String>) -> SignalRef {
    SignalRef::new(name)
}

impl From<&Signal> for SignalRef {
    fn from(signal: &Signal) -> Self {
        signal.to_ref()
    }
}

impl From<&str> for SignalRef {
    fn from(name: &str) -> Self {
        SignalRef::new(name)
    }
}

/// One occurrence of a signal.
///
/// Cloning is cheap; the name is shared.
#[derive(Debug, Clone)]
pub struct SignalInstance {
    name: Arc<str>,
    seq: u64,
    emitted_at: DateTime<Utc>,
}

impl SignalInstance {
    pub(crate) fn new(name: Arc<str>, seq: u64) -> Self {
        Self {
            name,
            seq,
            emitted_at: Utc::now(),
        }
    }

    /// Name of the signal this is an instance of.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arrival order within the owning context. Later instances have
    /// larger numbers.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn emitted_at(&self) -> DateTime<Utc> {
        self.emitted_at
    }

    /// Whether this instance arrived after `other`.
    pub fn is_newer_than(&self, other: &SignalInstance) -> bool {
        self.seq > other.seq
    }
}

impl PartialEq for SignalInstance {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.name == other.name
    }
}

impl Eq for SignalInstance {}

impl Hash for SignalInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.seq.hash(state);
    }
}

impl PartialOrd for SignalInstance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SignalInstance {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for SignalInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.seq)
    }
}

/// Build an instance outside a context, for tests and diagnostics.
#[doc(hidden)]
pub fn instance(name: &str, seq: u64) -> SignalInstance {
    SignalInstance::new(Arc::from(name), seq)
}
