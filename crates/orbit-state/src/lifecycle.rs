//! Lifecycle trail of a deployment intent group.
//!
//! `StateInfo` is an append-only list of `ActionEntry`s. The last entry is
//! the current state; earlier entries keep the context ids of previous
//! deployments so they can be disposed of later. Every entry carries a
//! revision one above its predecessor, which callers use as the
//! compare-and-set token when committing a transition.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StateValue {
    Created,
    Approved,
    Applied,
    Instantiated,
    InstantiateStopped,
    Terminated,
    TerminateStopped,
}

impl StateValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateValue::Created => "Created",
            StateValue::Approved => "Approved",
            StateValue::Applied => "Applied",
            StateValue::Instantiated => "Instantiated",
            StateValue::InstantiateStopped => "InstantiateStopped",
            StateValue::Terminated => "Terminated",
            StateValue::TerminateStopped => "TerminateStopped",
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations gated by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Approve,
    Instantiate,
    Update,
    StopInstantiate,
    StopTerminate,
    Terminate,
    Delete,
}

impl Operation {
    /// State recorded after the operation succeeds. Delete records nothing.
    pub fn target(&self) -> Option<StateValue> {
        match self {
            Operation::Approve => Some(StateValue::Approved),
            Operation::Instantiate | Operation::Update => Some(StateValue::Instantiated),
            Operation::StopInstantiate => Some(StateValue::InstantiateStopped),
            Operation::StopTerminate => Some(StateValue::TerminateStopped),
            Operation::Terminate => Some(StateValue::Terminated),
            Operation::Delete => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Approve => "approve",
            Operation::Instantiate => "instantiate",
            Operation::Update => "update",
            Operation::StopInstantiate => "stop instantiation",
            Operation::StopTerminate => "stop termination",
            Operation::Terminate => "terminate",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Rejected lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("deployment intent group must be approved before it can be instantiated")]
    NotApproved,

    #[error("deployment intent group is already approved")]
    AlreadyApproved,

    #[error("deployment intent group is already instantiated")]
    AlreadyInstantiated,

    #[error("deployment intent group is already terminated")]
    AlreadyTerminated,

    #[error("deployment intent group must be terminated before it can be deleted")]
    MustTerminate,

    #[error("cannot {operation} a deployment intent group in state {state}")]
    InvalidState {
        operation: Operation,
        state: StateValue,
    },

    #[error("deployment intent group has no lifecycle entries")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionEntry {
    pub state: StateValue,
    /// Context the entry refers to; empty for Created/Approved.
    #[serde(default)]
    pub context_id: String,
    /// Unix timestamp (seconds).
    pub time_stamp: u64,
    pub revision: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateInfo {
    #[serde(default)]
    pub status_context_id: String,
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
}

impl StateInfo {
    /// A fresh trail holding a single Created entry.
    pub fn created(now: u64) -> Self {
        let mut info = Self::default();
        info.append(StateValue::Created, "", now);
        info
    }

    pub fn current_state(&self) -> Option<StateValue> {
        self.actions.last().map(|entry| entry.state)
    }

    /// Revision of the last entry, 0 for an empty trail.
    pub fn revision(&self) -> u64 {
        self.actions.last().map_or(0, |entry| entry.revision)
    }

    /// Context id of the last entry, if it has one.
    pub fn last_context_id(&self) -> Option<&str> {
        self.actions
            .last()
            .map(|entry| entry.context_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Every distinct context id in the trail, oldest first.
    pub fn context_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for entry in &self.actions {
            let id = entry.context_id.as_str();
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    /// Append an entry one revision above the current one.
    pub fn append(&mut self, state: StateValue, context_id: &str, now: u64) -> &ActionEntry {
        let revision = self.revision() + 1;
        self.actions.push(ActionEntry {
            state,
            context_id: context_id.to_string(),
            time_stamp: now,
            revision,
        });
        if !context_id.is_empty() {
            self.status_context_id = context_id.to_string();
        }
        &self.actions[self.actions.len() - 1]
    }

    /// Check whether `operation` is legal from the current state.
    pub fn check(&self, operation: Operation) -> Result<(), TransitionError> {
        use StateValue::*;

        let Some(state) = self.current_state() else {
            return match operation {
                Operation::Delete => Ok(()),
                _ => Err(TransitionError::Empty),
            };
        };
        let invalid = TransitionError::InvalidState { operation, state };

        match (operation, state) {
            (Operation::Approve, Created) => Ok(()),
            (Operation::Approve, Approved) => Err(TransitionError::AlreadyApproved),
            (Operation::Approve, _) => Err(invalid),

            (Operation::Instantiate, Approved | Terminated | TerminateStopped) => Ok(()),
            (Operation::Instantiate, Created) => Err(TransitionError::NotApproved),
            (Operation::Instantiate, Instantiated) => Err(TransitionError::AlreadyInstantiated),
            (Operation::Instantiate, _) => Err(invalid),

            (Operation::Update, Instantiated) => Ok(()),
            (Operation::Update, _) => Err(invalid),

            (Operation::StopInstantiate, Instantiated) => Ok(()),
            (Operation::StopInstantiate, _) => Err(invalid),

            (Operation::StopTerminate, Terminated) => Ok(()),
            (Operation::StopTerminate, _) => Err(invalid),

            (Operation::Terminate, Instantiated | InstantiateStopped) => Ok(()),
            (Operation::Terminate, Terminated | TerminateStopped) => {
                Err(TransitionError::AlreadyTerminated)
            }
            (Operation::Terminate, _) => Err(invalid),

            (Operation::Delete, Created | Approved | Terminated | TerminateStopped) => Ok(()),
            (Operation::Delete, Instantiated | InstantiateStopped) => {
                Err(TransitionError::MustTerminate)
            }
            (Operation::Delete, Applied) => Err(invalid),
        }
    }
}
