use serde::{Deserialize, Serialize};

use crate::domain::property::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntegrationId(pub String);

/// A tenant's connection to one property management system. Credentials are
/// an opaque JSON document; only the adapter for `integration_type` knows
/// its shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PmsIntegration {
    pub id: IntegrationId,
    pub tenant_id: TenantId,
    pub integration_type: String,
    pub credentials: serde_json::Value,
    /// Cleared when the PMS rejects the credentials; rate sync stays paused
    /// until an operator re-activates the integration.
    pub active: bool,
}
