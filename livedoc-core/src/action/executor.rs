//! External-action executor.

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use super::ActionCall;
use crate::error::ActionError;

/// The collaborator that performs actions outside the state graph.
///
/// Calls are blocking from the engine's point of view: the next step of a
/// trigger runs only after `execute` returns.
pub trait ActionExecutor: Send {
    fn execute(&mut self, call: &ActionCall) -> Result<(), ActionError>;
}

/// Executor that records every call, for hosts with nothing to run and
/// for tests.
///
/// Clones share the same record, so a clone kept outside the runtime sees
/// the calls made through the one inside it.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    calls: Arc<Mutex<Vec<ActionCall>>>,
    failing: Arc<Mutex<IndexSet<String>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<ActionCall> {
        self.calls.lock().clone()
    }

    /// Make every call of `action` fail from now on.
    pub fn fail_on(&self, action: impl Into<String>) {
        self.failing.lock().insert(action.into());
    }
}

impl ActionExecutor for RecordingExecutor {
    fn execute(&mut self, call: &ActionCall) -> Result<(), ActionError> {
        if self.failing.lock().contains(&call.action) {
            return Err(ActionError::Failed {
                target: call.target.clone(),
                action: call.action.clone(),
                reason: "configured to fail".to_string(),
            });
        }
        self.calls.lock().push(call.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
