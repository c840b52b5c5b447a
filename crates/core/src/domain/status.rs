use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::group::GroupId;
use crate::domain::property::{PropertyId, TenantId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Property,
    Group,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Group => "group",
        }
    }
}

/// Target of a pricing run: a standalone property or a group (priced through
/// its main property).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity_id", rename_all = "lowercase")]
pub enum EntityRef {
    Property(PropertyId),
    Group(GroupId),
}

impl EntityRef {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::Property(_) => EntityType::Property,
            Self::Group(_) => EntityType::Group,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::Property(id) => &id.0,
            Self::Group(id) => &id.0,
        }
    }
}

/// Scheduler state machine over (entity, day). Persisted so a crash recovers
/// by reading the table, not by replaying events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown run state `{other}`")))
            }
        }
    }

    pub fn can_transition_to(&self, next: &RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Skipped)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Skipped)
                | (Self::Succeeded, Self::Running)
                | (Self::Succeeded, Self::Skipped)
                | (Self::Failed, Self::Running)
                | (Self::Failed, Self::Skipped)
                | (Self::Skipped, Self::Running)
                | (Self::Skipped, Self::Skipped)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoPricingStatus {
    pub entity: EntityRef,
    pub tenant_id: TenantId,
    pub enabled: bool,
    pub run_state: RunState,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Reason string for failed/skipped states, cleared on success.
    pub last_error: Option<String>,
}

impl AutoPricingStatus {
    pub fn new(entity: EntityRef, tenant_id: TenantId, enabled: bool) -> Self {
        Self { entity, tenant_id, enabled, run_state: RunState::Idle, last_run_at: None, last_error: None }
    }

    pub fn transition_to(&mut self, next: RunState) -> Result<(), DomainError> {
        if !self.run_state.can_transition_to(&next) {
            return Err(DomainError::InvariantViolation(format!(
                "invalid auto-pricing transition {} -> {} for {}",
                self.run_state.as_str(),
                next.as_str(),
                self.entity.entity_id()
            )));
        }
        self.run_state = next;
        Ok(())
    }
}
