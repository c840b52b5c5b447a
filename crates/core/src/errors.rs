use thiserror::Error;

use crate::domain::group::GroupId;
use crate::domain::property::{PropertyId, TenantId};

/// Violations of data-model invariants. Surfaced on write, never silently
/// swallowed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("group {group_id:?} would place property {property_id:?} in two groups of the tenant")]
    GroupCycle { group_id: GroupId, property_id: PropertyId },
    #[error("group {group_id:?} names a main property that is not a member")]
    GroupMissingMain { group_id: GroupId },
    #[error("booking for property {property_id:?} overlaps an existing stay")]
    BookingOverlap { property_id: PropertyId },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Engine-level failures. `SignalUnavailable` and adjuster failures are not
/// represented here: they degrade locally inside the combiner and never
/// propagate as errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid input: {0}")]
    InputInvalid(String),
    #[error("tenant scope violation for {tenant_id:?}")]
    TenantScopeViolation { tenant_id: TenantId },
    #[error("ai quota exhausted for tenant {tenant_id:?}")]
    QuotaExhausted { tenant_id: TenantId },
    #[error("pms credentials rejected for property {property_id:?}")]
    CredentialsInvalid { property_id: PropertyId },
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Boundary representation handed to the HTTP layer. Carries a correlation
/// id for log lookup and a user-safe message; internals stay in the logs.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl ApiError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "The credential does not grant access to this resource.",
            Self::QuotaExceeded { .. } => {
                "The AI pricing quota for this billing window is exhausted."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::QuotaExceeded { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl EngineError {
    pub fn into_api(self, correlation_id: impl Into<String>) -> ApiError {
        let correlation_id = correlation_id.into();
        let mut mapped = ApiError::from(self);
        match &mut mapped {
            ApiError::BadRequest { correlation_id: id, .. }
            | ApiError::Forbidden { correlation_id: id, .. }
            | ApiError::QuotaExceeded { correlation_id: id, .. }
            | ApiError::ServiceUnavailable { correlation_id: id, .. }
            | ApiError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            EngineError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            EngineError::InputInvalid(message) => {
                Self::BadRequest { message, correlation_id: unassigned }
            }
            EngineError::TenantScopeViolation { .. } => Self::Forbidden {
                message: "credential does not match the requested tenant".to_owned(),
                correlation_id: unassigned,
            },
            EngineError::QuotaExhausted { tenant_id } => Self::QuotaExceeded {
                message: format!("ai quota exhausted for tenant {}", tenant_id.0),
                correlation_id: unassigned,
            },
            EngineError::CredentialsInvalid { property_id } => Self::ServiceUnavailable {
                message: format!("pms credentials rejected for property {}", property_id.0),
                correlation_id: unassigned,
            },
            EngineError::Transient(message) | EngineError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            EngineError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::group::GroupId;
    use crate::domain::property::{PropertyId, TenantId};
    use crate::errors::{ApiError, DomainError, EngineError};

    #[test]
    fn domain_error_maps_to_bad_request() {
        let api = EngineError::from(DomainError::GroupMissingMain {
            group_id: GroupId("G-1".to_string()),
        })
        .into_api("req-1");

        assert!(matches!(
            api,
            ApiError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn tenant_scope_violation_maps_to_forbidden() {
        let api = EngineError::TenantScopeViolation { tenant_id: TenantId("T-2".to_string()) }
            .into_api("req-2");

        assert!(matches!(api, ApiError::Forbidden { .. }));
        assert_eq!(api.user_message(), "The credential does not grant access to this resource.");
    }

    #[test]
    fn quota_exhaustion_has_its_own_boundary_shape() {
        let api = EngineError::QuotaExhausted { tenant_id: TenantId("T-1".to_string()) }
            .into_api("req-3");

        assert!(matches!(api, ApiError::QuotaExceeded { .. }));
    }

    #[test]
    fn credentials_invalid_maps_to_service_unavailable() {
        let api = EngineError::CredentialsInvalid { property_id: PropertyId("P-1".to_string()) }
            .into_api("req-4");

        assert!(matches!(api, ApiError::ServiceUnavailable { .. }));
        assert_eq!(api.correlation_id(), "req-4");
    }
}
