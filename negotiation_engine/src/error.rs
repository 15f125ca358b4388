//! Engine errors.
//!
//! Two layers:
//! - [`Rejection`]: why a planned action is illegal. Raised synchronously at
//!   submission time and again for deployment re-validation during resolution.
//!   Serializable so it can travel to the participant verbatim.
//! - [`Error`]: everything else the kernel can fail with. A resolution that
//!   returns `Err` has applied nothing.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::ActionKind;
use crate::domain::{Capability, CounterKey, NodeCategory, Role};

/// Engine result type.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Reasons a planned action or submission is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Rejection {
    #[error("{action} is not in the {role} catalog")]
    NotInCatalog { action: ActionKind, role: Role },

    #[error("{submitted} actions submitted, at most {cap} allowed per turn")]
    TooManyActions { submitted: usize, cap: usize },

    #[error("no actions remaining this turn: {remaining} free slot(s), {requested} requested (one slot is reserved for {reserved_for})")]
    ActionsExhausted {
        remaining: usize,
        requested: usize,
        reserved_for: String,
    },

    #[error("{action} needs a target node")]
    MissingTarget { action: ActionKind },

    #[error("{action} does not take a target node")]
    UnexpectedTarget { action: ActionKind },

    #[error("node {node:?} does not exist")]
    UnknownNode { node: String },

    #[error("{action} cannot target {node:?} ({category})")]
    WrongCategory {
        action: ActionKind,
        node: String,
        category: NodeCategory,
    },

    #[error("node {node:?} is blocked for {turns} more turn(s)")]
    NodeBlocked { node: String, turns: u32 },

    #[error("{capability} is already deployed on {node:?}")]
    AlreadyDeployed { node: String, capability: Capability },

    #[error("{action} appears more than once in the submission")]
    DuplicateAction { action: ActionKind },

    #[error("{action} requires {counter:?} >= {required}, currently {actual}")]
    Precondition {
        action: ActionKind,
        counter: CounterKey,
        required: i64,
        actual: i64,
    },

    #[error("node {node:?} is not blocked")]
    NodeNotBlocked { node: String },

    #[error("the match is already decided")]
    MatchOver,
}

/// Kernel errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("action rejected: {0}")]
    Rejected(#[from] Rejection),

    /// A stored action references state that does not exist. Design-time
    /// invariant violation: the whole resolution is abandoned.
    #[error("resolution referenced unknown node {0:?}")]
    UnknownNode(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("match is already over")]
    GameOver,

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
