//! Handles, instruction kinds, and the records stored in a context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Opaque identifier of one deployment context.
pub type ContextId = String;

/// Address of a node in a context tree. Only the store hands these out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    pub(crate) fn new(path: String) -> Self {
        Self(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of a child node one level below this one.
    pub(crate) fn child(&self, level: &str) -> Handle {
        Handle(format!("{}{level}/", self.0))
    }

    /// Path of a named child under `level`.
    pub(crate) fn named_child(&self, level: &str, name: &str) -> Handle {
        Handle(format!("{}{level}/{name}/", self.0))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Level an instruction applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionLevel {
    App,
    Resource,
}

/// Kind of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionType {
    Order,
    Dependency,
}

impl InstructionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionLevel::App => "app",
            InstructionLevel::Resource => "resource",
        }
    }
}

impl InstructionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionType::Order => "order",
            InstructionType::Dependency => "dependency",
        }
    }
}

impl FromStr for InstructionLevel {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "app" => Ok(InstructionLevel::App),
            "resource" => Ok(InstructionLevel::Resource),
            other => Err(ContextError::InvalidInstruction(format!("unknown level {other:?}"))),
        }
    }
}

impl FromStr for InstructionType {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(InstructionType::Order),
            "dependency" => Ok(InstructionType::Dependency),
            other => Err(ContextError::InvalidInstruction(format!("unknown type {other:?}"))),
        }
    }
}

/// Root metadata of a context, written once when it is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompositeAppMeta {
    pub project: String,
    pub composite_app: String,
    pub version: String,
    pub release: String,
    pub deployment_intent_group: String,
    pub namespace: String,
    pub logical_cloud: String,
    #[serde(default)]
    pub level: String,
}

/// Run-time status of a context as seen by the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContextStatus {
    Instantiating,
    Instantiated,
    InstantiateFailed,
    Updating,
    Updated,
    UpdateFailed,
    Terminating,
    Terminated,
    TerminateFailed,
}

/// App order instruction: apps in declared order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppOrder {
    #[serde(rename = "apporder")]
    pub apps: Vec<String>,
}

/// Resource order instruction of one cluster: resources in declared order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceOrder {
    #[serde(rename = "resorder")]
    pub resources: Vec<String>,
}
