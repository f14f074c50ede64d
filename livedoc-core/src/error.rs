//! Error types.
//!
//! Only structural problems and API misuse surface as [`EngineError`].
//! Parse failures live inside values, inversion failures turn into reverted
//! edits, and external action failures are logged and skipped.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("Component {component} has no state variable named {variable}")]
    UnknownVariable { component: String, variable: String },

    #[error("Duplicate component name: {0}")]
    DuplicateComponent(String),

    #[error("Cyclic dependency declared: {dependent} depends on {dependency}, which already depends on it")]
    Cycle {
        dependency: String,
        dependent: String,
    },

    #[error("Re-entrant read of {0} while it is being computed")]
    ReentrantRead(String),

    #[error("{variable} is part of a broken subgraph: {reason}")]
    Broken { variable: String, reason: String },

    #[error("Evaluation depth limit of {limit} exceeded while computing {variable}")]
    DepthExceeded { variable: String, limit: usize },

    #[error("Component {0} is not editable")]
    NotEditable(String),

    #[error("Component {0} is not a trigger")]
    NotTrigger(String),

    #[error("{0} is not an essential variable")]
    NotEssential(String),

    #[error("Trigger chain starting at {0} forms a cycle")]
    TriggerCycle(String),

    #[error("Triggers did not settle within {0} rounds")]
    TriggerLoop(usize),

    #[error("Invalid declaration for {component}: {reason}")]
    InvalidDeclaration { component: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Structural errors poison the variables they pass through.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineError::Cycle { .. }
                | EngineError::ReentrantRead(_)
                | EngineError::Broken { .. }
                | EngineError::DepthExceeded { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Why a requested value could not be pushed back through a definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InversionError {
    #[error("{0} is fixed")]
    Fixed(String),

    #[error("{0} has no inverse definition")]
    NoInverse(String),

    #[error("{variable} has {free} modifiable inputs; exactly one is required")]
    Underdetermined { variable: String, free: usize },

    #[error("Cannot solve: {0}")]
    Unsolvable(String),

    #[error("Conflicting values requested for {0}")]
    Conflict(String),

    #[error(transparent)]
    Structural(#[from] EngineError),
}

/// Math text that could not be parsed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot parse {input:?} at offset {offset}")]
pub struct ParseError {
    pub input: String,
    pub offset: usize,
}

impl ParseError {
    pub fn new(input: &str, offset: usize) -> Self {
        Self {
            input: input.to_string(),
            offset,
        }
    }
}

/// Failure reported by the external action executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Action {action} on {target} failed: {reason}")]
    Failed {
        target: String,
        action: String,
        reason: String,
    },

    #[error("Action {0} is not supported")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_classification() {
        assert!(EngineError::ReentrantRead("a.value".into()).is_structural());
        assert!(!EngineError::NotEditable("a".into()).is_structural());
    }

    #[test]
    fn inversion_wraps_engine_errors() {
        let err: InversionError = EngineError::UnknownComponent("z".into()).into();
        assert_eq!(err.to_string(), "Unknown component: z");
    }
}
