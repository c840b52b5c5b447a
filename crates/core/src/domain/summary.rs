use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::property::PropertyId;
use crate::domain::status::EntityRef;

/// Classification of a per-run issue. Kinds, not types: every error that
/// reaches the scheduler boundary is folded into one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    SignalUnavailable,
    AdjusterUnavailable,
    QuotaExhausted,
    CredentialsInvalid,
    Transient,
    Persistence,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunIssue {
    pub kind: IssueKind,
    pub property_id: Option<PropertyId>,
    pub date: Option<NaiveDate>,
    pub detail: String,
}

impl RunIssue {
    pub fn new(kind: IssueKind, detail: impl Into<String>) -> Self {
        Self { kind, property_id: None, date: None, detail: detail.into() }
    }

    pub fn for_property(mut self, property_id: PropertyId) -> Self {
        self.property_id = Some(property_id);
        self
    }

    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Operator-facing result of one horizon run. Drives UI toasts and the
/// billing system's quota displays; no raw errors cross this boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub entity: EntityRef,
    pub days_generated: u32,
    pub days_skipped_locked: u32,
    pub llm_calls_used: u32,
    pub credentials_invalid: Vec<PropertyId>,
    pub failed_dates: Vec<(PropertyId, NaiveDate)>,
    pub issues: Vec<RunIssue>,
}

impl RunSummary {
    pub fn empty(entity: EntityRef) -> Self {
        Self {
            entity,
            days_generated: 0,
            days_skipped_locked: 0,
            llm_calls_used: 0,
            credentials_invalid: Vec::new(),
            failed_dates: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn record(&mut self, issue: RunIssue) {
        self.issues.push(issue);
    }
}
