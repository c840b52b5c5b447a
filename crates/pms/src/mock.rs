//! Scripted in-process adapter for tests. Calls are answered from queues
//! primed up front and every push is recorded so assertions can inspect
//! exactly what would have reached the PMS.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::adapter::{
    PmsAdapter, PmsError, PropertySettings, PushOutcome, RateUpdate, RemoteProperty, Reservation,
};

/// One recorded `push_rates` call.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedPush {
    pub pms_property_id: String,
    pub rates: Vec<RateUpdate>,
}

#[derive(Default)]
struct MockState {
    properties: Vec<RemoteProperty>,
    reservations: Vec<Reservation>,
    push_script: VecDeque<Result<PushOutcome, PmsError>>,
    date_script: HashMap<NaiveDate, VecDeque<Result<PushOutcome, PmsError>>>,
    pushes: Vec<RecordedPush>,
    settings_updates: Vec<(String, PropertySettings)>,
    unauthorized: bool,
}

#[derive(Default)]
pub struct MockAdapter {
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(properties: Vec<RemoteProperty>) -> Self {
        let adapter = Self::new();
        adapter.lock().properties = properties;
        adapter
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_reservations(&self, reservations: Vec<Reservation>) {
        self.lock().reservations = reservations;
    }

    /// All subsequent calls answer `Unauthorized` until cleared.
    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.lock().unauthorized = unauthorized;
    }

    /// Queues the answer for the next `push_rates` call. Once the queue is
    /// drained, pushes succeed with a complete outcome.
    pub fn script_push(&self, result: Result<PushOutcome, PmsError>) {
        self.lock().push_script.push_back(result);
    }

    /// Queues an answer for single-date pushes of a specific date. Keyed
    /// scripting stays deterministic when the caller pushes dates
    /// concurrently.
    pub fn script_push_for_date(&self, date: NaiveDate, result: Result<PushOutcome, PmsError>) {
        self.lock().date_script.entry(date).or_default().push_back(result);
    }

    pub fn recorded_pushes(&self) -> Vec<RecordedPush> {
        self.lock().pushes.clone()
    }

    pub fn recorded_settings_updates(&self) -> Vec<(String, PropertySettings)> {
        self.lock().settings_updates.clone()
    }

    fn check_auth(&self) -> Result<(), PmsError> {
        if self.lock().unauthorized {
            Err(PmsError::Unauthorized)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PmsAdapter for MockAdapter {
    async fn test_connection(&self, _credentials: &Value) -> Result<(), PmsError> {
        self.check_auth()
    }

    async fn list_properties(&self, _credentials: &Value) -> Result<Vec<RemoteProperty>, PmsError> {
        self.check_auth()?;
        Ok(self.lock().properties.clone())
    }

    async fn fetch_reservations(
        &self,
        _credentials: &Value,
        _pms_property_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Reservation>, PmsError> {
        self.check_auth()?;
        let state = self.lock();
        Ok(state
            .reservations
            .iter()
            .filter(|r| r.start_date < to && r.end_date_exclusive > from)
            .cloned()
            .collect())
    }

    async fn push_rates(
        &self,
        _credentials: &Value,
        pms_property_id: &str,
        rates: &[RateUpdate],
    ) -> Result<PushOutcome, PmsError> {
        self.check_auth()?;
        let mut state = self.lock();
        state.pushes.push(RecordedPush {
            pms_property_id: pms_property_id.to_string(),
            rates: rates.to_vec(),
        });
        if let [rate] = rates {
            if let Some(queue) = state.date_script.get_mut(&rate.date) {
                if let Some(result) = queue.pop_front() {
                    return result;
                }
            }
        }
        match state.push_script.pop_front() {
            Some(result) => result,
            None => {
                let mut outcome = PushOutcome::default();
                outcome.ok_count = rates.len();
                Ok(outcome)
            }
        }
    }

    async fn update_property_settings(
        &self,
        _credentials: &Value,
        pms_property_id: &str,
        settings: &PropertySettings,
    ) -> Result<(), PmsError> {
        self.check_auth()?;
        self.lock().settings_updates.push((pms_property_id.to_string(), settings.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;

    use crate::adapter::{PmsAdapter, PmsError, RateUpdate, Reservation};

    use super::MockAdapter;

    fn date(value: &str) -> NaiveDate {
        value.parse().expect("valid test date")
    }

    #[tokio::test]
    async fn scripted_errors_drain_in_order_then_default_to_success() {
        let adapter = MockAdapter::new();
        adapter.script_push(Err(PmsError::Transient("flaky".to_string())));

        let rates = vec![RateUpdate { date: date("2025-06-01"), price: 10_000 }];
        let first = adapter.push_rates(&json!({}), "P-1", &rates).await;
        assert!(matches!(first, Err(PmsError::Transient(_))));

        let second = adapter.push_rates(&json!({}), "P-1", &rates).await.expect("push");
        assert_eq!(second.ok_count, 1);
        assert_eq!(adapter.recorded_pushes().len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_toggle_blocks_every_call() {
        let adapter = MockAdapter::new();
        adapter.set_unauthorized(true);
        assert!(matches!(
            adapter.test_connection(&json!({})).await,
            Err(PmsError::Unauthorized)
        ));
        assert!(adapter.recorded_pushes().is_empty());
    }

    #[tokio::test]
    async fn reservations_are_filtered_by_overlap() {
        let adapter = MockAdapter::new();
        adapter.set_reservations(vec![Reservation {
            pms_booking_id: "BK-1".to_string(),
            start_date: date("2025-06-01"),
            end_date_exclusive: date("2025-06-04"),
            price_per_night: Some(11_000),
            channel: "airbnb".to_string(),
        }]);

        let hit = adapter
            .fetch_reservations(&json!({}), "P-1", date("2025-06-03"), date("2025-06-10"))
            .await
            .expect("fetch");
        assert_eq!(hit.len(), 1);

        let miss = adapter
            .fetch_reservations(&json!({}), "P-1", date("2025-06-04"), date("2025-06-10"))
            .await
            .expect("fetch");
        assert!(miss.is_empty());
    }
}
