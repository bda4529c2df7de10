//! # Ripple
//!
//! A reactive rule-activation engine. Behavior is declared as **states**
//! that say which properties they read, which they write and which
//! signals wake them. A scheduling [`Context`] matches signals against
//! those declarations and fires the states whose conditions hold.
//!
//! ## Core Concepts
//!
//! - [`Property`] = shared, permission-checked values (`module:name`)
//! - [`Signal`] = named notification; each occurrence is a [`SignalInstance`]
//! - [`Constraint`] = OR of AND-groups ([`Conjunct`]) of signal references
//! - [`State`] = reads + writes + constraint + [`Action`]
//! - [`Activation`] = one state's progress toward firing
//!
//! The key principle: **one write property, one winner per round**. When
//! several matched states write the same property, only the most
//! specific fires; the rest are wiped and start over.
//!
//! ## Architecture
//!
//! ```text
//! Context::emit() / set_property() / ActionContext writes
//!     │
//!     ▼ queued until the next round
//! Context::step()
//!     │
//!     ├─► retire superseded / expired instances ─► Activation::wiped(sig)
//!     │
//!     ├─► offer instances ─► Activation A  Matched (2.0) ──────┐
//!     │                  ─► Activation B  Matched (1.0) ──────┤ same write prop
//!     │                  ─► Activation C  Pending              │
//!     │                                                        ▼
//!     │                                              arbitration: A fires,
//!     │                                              B is wiped
//!     │
//!     └─► tokio::spawn(A.action) ─► Outcome ─► next round
//!                                    │
//!                                    ├─ Nothing
//!                                    ├─ Emit   (state signal queued)
//!                                    └─ Delete (state deregistered)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **At most one live activation per state**
//! 2. **Claims follow the match** - a Matched activation claims every property it writes
//! 3. **Wipes are synchronous** - a losing activation releases its claims in the same round
//! 4. **Deterministic arbitration** - specificity, then declaration order, then activation id
//! 5. **No same-round visibility** - signals produced during a round are matched in a later one
//!
//! ## Example
//!
//! ```no_run
//! use ripple_core::{ActionContext, Context, Module, Outcome, Property, State};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut ctx = Context::with_defaults();
//! ctx.add_module(
//!     Module::new("rawio")
//!         .property(Property::new("rawio", "in").default_value(""))
//!         .property(Property::new("rawio", "out").default_value("")),
//! )?;
//! ctx.add_module(
//!     Module::new("echo").depends_on("rawio").state(
//!         State::builder("repeat")
//!             .read("rawio:in")
//!             .write("rawio:out")
//!             .action(|ctx: ActionContext| async move {
//!                 let text = ctx.get("rawio:in")?;
//!                 ctx.set("rawio:out", text)?;
//!                 Outcome::done()
//!             }),
//!     ),
//! )?;
//!
//! ctx.set_property("rawio:in", "hello")?;
//! ctx.settle().await?;
//! assert_eq!(ctx.get_property("rawio:out")?, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## What This Is Not
//!
//! Ripple is **not**:
//! - A persistence layer (all state is in memory)
//! - A dialog manager (natural language is up to your states)
//! - A distributed scheduler

mod action;
mod activation;
mod config;
mod constraint;
mod context;
mod error;
mod module;
mod property;
mod report;
mod signal;
mod state;

pub use action::ActionContext;
pub use activation::{Activation, ActivationId, ActivationStatus};
pub use config::ContextConfig;
pub use constraint::{Conjunct, Constraint, ConstraintMatch, Disjunct};
pub use context::{Context, ContextHandle, StateId};
pub use error::EngineError;
pub use module::Module;
pub use property::{
    changed_signal, popped_signal, pushed_signal, Property, PropertyStore, SharedProperties,
    CHANGED, POPPED, PUSHED,
};
pub use report::{ActivationInfo, FiringRecord, FiringStatus, RoundReport};
pub use signal::{qualify, s, Signal, SignalInstance, SignalRef, NAME_SEPARATOR};
pub use state::{derive_constraint, Action, Outcome, State, StateBuilder};

#[doc(hidden)]
pub use signal::instance;

// Re-export async_trait for implementing `Action` on custom types
pub use async_trait::async_trait;
