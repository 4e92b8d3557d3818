//! Error taxonomy for building and combining actions.

use thiserror::Error;

/// The action asks for something the grid or the action space forbids:
/// unknown element, out-of-range value, unauthorized category.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("illegal action: {0}")]
pub struct IllegalAction(pub String);

/// The action is self-contradictory or physically impossible as written.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AmbiguousAction {
    #[error("invalid line status: {0}")]
    InvalidLineStatus(String),
    #[error("wrong number of {what}: expected {expected}, got {got}")]
    WrongSize {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("redispatching is not available on this grid")]
    RedispatchUnavailable,
    #[error("invalid redispatching: {0}")]
    InvalidRedispatching(String),
    #[error("invalid storage action: {0}")]
    InvalidStorage(String),
    #[error("invalid bus assignment: {0}")]
    InvalidBusStatus(String),
    #[error("bus selection names no element kind")]
    EmptySelection,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error(transparent)]
    Illegal(#[from] IllegalAction),
    #[error(transparent)]
    Ambiguous(#[from] AmbiguousAction),
    #[error("cannot combine actions defined on different grids")]
    DifferentGrid,
    #[error("{kind} {id} does not exist")]
    UnknownElement { kind: &'static str, id: usize },
}
