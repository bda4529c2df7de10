//! Engine error types.
//!
//! Engine APIs return [`EngineError`]. State actions return
//! `anyhow::Result`, so an action can bubble an `EngineError` up with `?`
//! next to its own failures.
//!
//! Every variant has a stable machine-readable code with the `ENGINE_`
//! prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`EngineError::UnknownProperty`] | `ENGINE_UNKNOWN_PROPERTY` | No |
//! | [`EngineError::ReadDenied`] | `ENGINE_READ_DENIED` | No |
//! | [`EngineError::WriteDenied`] | `ENGINE_WRITE_DENIED` | No |
//! | [`EngineError::PushDenied`] | `ENGINE_PUSH_DENIED` | No |
//! | [`EngineError::PopDenied`] | `ENGINE_POP_DENIED` | No |
//! | [`EngineError::NotAChild`] | `ENGINE_NOT_A_CHILD` | No |
//! | [`EngineError::UnknownState`] | `ENGINE_UNKNOWN_STATE` | No |
//! | [`EngineError::NotAReceptor`] | `ENGINE_NOT_A_RECEPTOR` | No |
//! | [`EngineError::StateDeleted`] | `ENGINE_STATE_DELETED` | No |
//! | [`EngineError::NoRuntime`] | `ENGINE_NO_RUNTIME` | No |
//! | [`EngineError::UnknownModule`] | `ENGINE_UNKNOWN_MODULE` | No |
//! | [`EngineError::DuplicateModule`] | `ENGINE_DUPLICATE_MODULE` | No |
//! | [`EngineError::MissingDependency`] | `ENGINE_MISSING_DEPENDENCY` | Yes |
//! | [`EngineError::RoundLimitExceeded`] | `ENGINE_ROUND_LIMIT_EXCEEDED` | Yes |
//! | [`EngineError::Config`] | `ENGINE_CONFIG` | No |

use thiserror::Error;

/// Errors raised by the activation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No property is registered under this qualified name.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// The state did not declare the property (or its parent) as read.
    #[error("state `{state}` may not read property `{property}`")]
    ReadDenied { state: String, property: String },

    /// The state did not declare the property as written, or the property
    /// forbids writes.
    #[error("state `{state}` may not write property `{property}`")]
    WriteDenied { state: String, property: String },

    #[error("state `{state}` may not push children onto `{property}`")]
    PushDenied { state: String, property: String },

    #[error("state `{state}` may not pop children from `{property}`")]
    PopDenied { state: String, property: String },

    /// `pop` was called on a property that has no parent.
    #[error("property `{0}` is not a child property")]
    NotAChild(String),

    #[error("unknown state: {0}")]
    UnknownState(String),

    /// Manual invocation was requested for a state that is not a receptor.
    #[error("state `{0}` is not a receptor")]
    NotAReceptor(String),

    /// The state returned `Outcome::Delete` earlier and is deregistered.
    #[error("state `{0}` was deleted")]
    StateDeleted(String),

    /// A receptor was invoked outside of a Tokio runtime.
    #[error("receptor `{0}` invoked outside of a Tokio runtime")]
    NoRuntime(String),

    /// A state was declared into a module that is not registered.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("module `{0}` is already registered")]
    DuplicateModule(String),

    /// A module was added before one of the modules it depends on.
    #[error("module `{module}` depends on unregistered module `{dependency}`")]
    MissingDependency { module: String, dependency: String },

    /// `settle` ran out of rounds before the context became idle.
    #[error("context did not settle within {0} rounds")]
    RoundLimitExceeded(u64),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProperty(_) => "ENGINE_UNKNOWN_PROPERTY",
            Self::ReadDenied { .. } => "ENGINE_READ_DENIED",
            Self::WriteDenied { .. } => "ENGINE_WRITE_DENIED",
            Self::PushDenied { .. } => "ENGINE_PUSH_DENIED",
            Self::PopDenied { .. } => "ENGINE_POP_DENIED",
            Self::NotAChild(_) => "ENGINE_NOT_A_CHILD",
            Self::UnknownState(_) => "ENGINE_UNKNOWN_STATE",
            Self::NotAReceptor(_) => "ENGINE_NOT_A_RECEPTOR",
            Self::StateDeleted(_) => "ENGINE_STATE_DELETED",
            Self::NoRuntime(_) => "ENGINE_NO_RUNTIME",
            Self::UnknownModule(_) => "ENGINE_UNKNOWN_MODULE",
            Self::DuplicateModule(_) => "ENGINE_DUPLICATE_MODULE",
            Self::MissingDependency { .. } => "ENGINE_MISSING_DEPENDENCY",
            Self::RoundLimitExceeded(_) => "ENGINE_ROUND_LIMIT_EXCEEDED",
            Self::Config(_) => "ENGINE_CONFIG",
        }
    }

    /// Whether retrying the operation later may succeed.
    ///
    /// A missing dependency resolves once the dependency is loaded, and a
    /// context that hit the round limit may still settle on a later call.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingDependency { .. } | Self::RoundLimitExceeded(_)
        )
    }
}
