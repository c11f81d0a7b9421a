//! Durable record of a provider call that has not yet been reflected locally

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::stream::{StreamChanges, Transition};
use super::target::MultistreamTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum IntentOperation {
    Create,
    Activate,
    Suspend,
    Terminate,
    Delete,
    Update { changes: StreamChanges },
    AttachTarget { target: MultistreamTarget },
}

impl IntentOperation {
    /// `None` for create, which has no source state.
    pub fn transition(&self) -> Option<Transition> {
        match self {
            IntentOperation::Create => None,
            IntentOperation::Activate => Some(Transition::Activate),
            IntentOperation::Suspend => Some(Transition::Suspend),
            IntentOperation::Terminate => Some(Transition::Terminate),
            IntentOperation::Delete => Some(Transition::Delete),
            IntentOperation::Update { .. } => Some(Transition::Update),
            IntentOperation::AttachTarget { .. } => Some(Transition::AttachTarget),
        }
    }

    pub fn name(&self) -> &'static str {
        match self.transition() {
            Some(t) => t.as_str(),
            None => "create",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentOutcome {
    /// Local state reflects the provider call
    Completed,
    /// Provider call failed; nothing to reconcile
    Aborted,
    /// Orphaned remote resource was removed
    Compensated,
    /// A later change made the operation irrelevant
    Superseded,
    /// Nothing left to reconcile against
    Abandoned,
}

impl IntentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentOutcome::Completed => "completed",
            IntentOutcome::Aborted => "aborted",
            IntentOutcome::Compensated => "compensated",
            IntentOutcome::Superseded => "superseded",
            IntentOutcome::Abandoned => "abandoned",
        }
    }
}

impl FromStr for IntentOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(IntentOutcome::Completed),
            "aborted" => Ok(IntentOutcome::Aborted),
            "compensated" => Ok(IntentOutcome::Compensated),
            "superseded" => Ok(IntentOutcome::Superseded),
            "abandoned" => Ok(IntentOutcome::Abandoned),
            other => Err(format!("unknown intent outcome '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamIntent {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub operation: IntentOperation,
    /// Known up front for transitions; set after the provider answers for create
    pub remote_id: Option<String>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub outcome: Option<IntentOutcome>,
}

impl StreamIntent {
    pub fn new(stream_id: Uuid, operation: IntentOperation, remote_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream_id,
            operation,
            remote_id,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            resolved_at: None,
            outcome: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
