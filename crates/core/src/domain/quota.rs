use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::property::TenantId;

/// Per-tenant LLM call budget for the current billing window. Reserved
/// before a call is made; the reservation is the only cross-task mutable
/// resource in the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AiQuotaCounter {
    pub tenant_id: TenantId,
    pub window_start: DateTime<Utc>,
    pub ai_calls_used: i64,
    pub ai_calls_max: i64,
}

impl AiQuotaCounter {
    pub fn remaining(&self) -> i64 {
        (self.ai_calls_max - self.ai_calls_used).max(0)
    }

    pub fn is_exhausted(&self) -> bool {
        self.ai_calls_used >= self.ai_calls_max
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::property::TenantId;

    use super::AiQuotaCounter;

    #[test]
    fn remaining_never_goes_negative() {
        let counter = AiQuotaCounter {
            tenant_id: TenantId("T-1".to_string()),
            window_start: Utc::now(),
            ai_calls_used: 120,
            ai_calls_max: 100,
        };
        assert_eq!(counter.remaining(), 0);
        assert!(counter.is_exhausted());
    }
}
