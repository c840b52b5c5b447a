//! Rate fan-out writer: carries effective prices to the PMS. Dates are
//! pushed as independent calls so one poisoned date cannot sink the rest of
//! the batch; transient failures retry with backoff. A credential rejection
//! short-circuits the property: dates not yet started are skipped, retries
//! in flight are abandoned, and the property's sync is paused.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinSet;
use tracing::{info, warn};

use priceye_core::{IntegrationId, IssueKind, Property, PropertyId, RunIssue, RunSummary, TenantId};
use priceye_pms::{PmsAdapter, PmsError, RateUpdate};

use crate::context::{map_repo_error, EngineContext};
use crate::horizon::PropertyRates;

/// Per-property outcome of one fan-out pass.
#[derive(Clone, Debug)]
pub struct PropertyPushReport {
    pub property_id: PropertyId,
    /// Sync disabled or no integration; nothing was attempted.
    pub skipped: bool,
    pub ok_count: usize,
    pub failed_dates: Vec<(NaiveDate, String)>,
    pub credentials_invalid: bool,
    /// Dates never attempted because the credentials were already rejected.
    pub auth_skipped: usize,
    /// Whole-property failure before any date was attempted.
    pub error: Option<String>,
}

impl PropertyPushReport {
    fn empty(property_id: PropertyId) -> Self {
        Self {
            property_id,
            skipped: false,
            ok_count: 0,
            failed_dates: Vec::new(),
            credentials_invalid: false,
            auth_skipped: 0,
            error: None,
        }
    }

    fn skipped(property_id: PropertyId) -> Self {
        Self { skipped: true, ..Self::empty(property_id) }
    }

    fn failed(property_id: PropertyId, error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::empty(property_id) }
    }
}

pub struct RateFanOut {
    ctx: Arc<EngineContext>,
}

impl RateFanOut {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub(crate) async fn push_all(
        &self,
        tenant: &TenantId,
        pushes: Vec<PropertyRates>,
    ) -> Vec<PropertyPushReport> {
        let mut reports = Vec::with_capacity(pushes.len());
        for push in pushes {
            reports.push(self.push_property(tenant, &push.property, push.rates).await);
        }
        reports
    }

    pub async fn push_property(
        &self,
        tenant: &TenantId,
        property: &Property,
        rates: Vec<RateUpdate>,
    ) -> PropertyPushReport {
        if !property.pms_sync_enabled {
            info!(
                event_name = "fanout.sync_disabled",
                property_id = %property.id.0,
                "skipping pms push"
            );
            return PropertyPushReport::skipped(property.id.clone());
        }
        let (integration_id, pms_id) = match (&property.pms_integration_id, &property.pms_id) {
            (Some(integration_id), Some(pms_id)) => (integration_id.clone(), pms_id.clone()),
            _ => {
                info!(
                    event_name = "fanout.no_integration",
                    property_id = %property.id.0,
                    "property has no pms binding"
                );
                return PropertyPushReport::skipped(property.id.clone());
            }
        };

        let integration = match self
            .ctx
            .integrations
            .find(tenant, &IntegrationId(integration_id.clone()))
            .await
            .map_err(map_repo_error)
        {
            Ok(Some(integration)) => integration,
            Ok(None) => {
                return PropertyPushReport::failed(
                    property.id.clone(),
                    format!("integration {integration_id} not found"),
                );
            }
            Err(error) => return PropertyPushReport::failed(property.id.clone(), error.to_string()),
        };
        if !integration.active {
            info!(
                event_name = "fanout.integration_paused",
                property_id = %property.id.0,
                integration_id = %integration.id.0,
                "integration is paused"
            );
            return PropertyPushReport::skipped(property.id.clone());
        }
        let adapter = match self.ctx.registry.resolve(&integration.integration_type) {
            Some(adapter) => adapter,
            None => {
                return PropertyPushReport::failed(
                    property.id.clone(),
                    format!("no adapter registered for `{}`", integration.integration_type),
                );
            }
        };

        let mut report = PropertyPushReport::empty(property.id.clone());
        let credentials = Arc::new(integration.credentials.clone());
        let retries = self.ctx.config.retry_attempts;
        let backoff = Arc::new(self.ctx.config.retry_backoff_secs.clone());
        let auth_rejected = Arc::new(AtomicBool::new(false));

        let mut join_set: JoinSet<(NaiveDate, DatePush)> = JoinSet::new();
        for rate in rates {
            let adapter = adapter.clone();
            let credentials = credentials.clone();
            let pms_id = pms_id.clone();
            let backoff = backoff.clone();
            let auth_rejected = auth_rejected.clone();
            join_set.spawn(async move {
                let result = push_with_retry(
                    adapter,
                    &credentials,
                    &pms_id,
                    &rate,
                    retries,
                    &backoff,
                    &auth_rejected,
                )
                .await;
                (rate.date, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, DatePush::Ok(ok_count))) => report.ok_count += ok_count,
                Ok((date, DatePush::AuthRejected)) => {
                    warn!(
                        event_name = "fanout.credentials_rejected",
                        property_id = %property.id.0,
                        date = %date,
                        "pms rejected the credentials"
                    );
                    report.credentials_invalid = true;
                }
                Ok((_, DatePush::AuthSkipped)) => report.auth_skipped += 1,
                Ok((date, DatePush::Failed(error))) => {
                    report.failed_dates.push((date, error.to_string()));
                }
                Err(join_error) => {
                    report.error = Some(format!("push task failed: {join_error}"));
                }
            }
        }
        report.failed_dates.sort_by_key(|(date, _)| *date);
        if report.auth_skipped > 0 {
            info!(
                event_name = "fanout.dates_skipped_after_auth_failure",
                property_id = %property.id.0,
                skipped = report.auth_skipped,
                "remaining dates were not pushed"
            );
        }

        if report.credentials_invalid {
            self.pause_sync(tenant, property, &integration.id).await;
        }
        report
    }

    /// Pauses both the property's sync flag and the integration. Re-enabling
    /// is an operator action after fixing the credentials.
    async fn pause_sync(
        &self,
        tenant: &TenantId,
        property: &Property,
        integration_id: &IntegrationId,
    ) {
        if let Err(error) =
            self.ctx.properties.set_pms_sync_enabled(tenant, &property.id, false).await
        {
            warn!(
                event_name = "fanout.pause_failed",
                property_id = %property.id.0,
                error = %error,
                "could not disable property sync"
            );
        }
        if let Err(error) =
            self.ctx.integrations.set_active(tenant, integration_id, false).await
        {
            warn!(
                event_name = "fanout.pause_failed",
                integration_id = %integration_id.0,
                error = %error,
                "could not pause integration"
            );
        }
    }
}

enum DatePush {
    Ok(usize),
    /// This date's push got the 401/403; it sets the short-circuit flag.
    AuthRejected,
    /// Not attempted: another date already had its credentials rejected.
    AuthSkipped,
    Failed(PmsError),
}

async fn push_with_retry(
    adapter: Arc<dyn PmsAdapter>,
    credentials: &serde_json::Value,
    pms_id: &str,
    rate: &RateUpdate,
    retries: u32,
    backoff_secs: &[u64],
    auth_rejected: &AtomicBool,
) -> DatePush {
    if auth_rejected.load(Ordering::SeqCst) {
        return DatePush::AuthSkipped;
    }
    let mut attempt: u32 = 0;
    loop {
        match adapter.push_rates(credentials, pms_id, std::slice::from_ref(rate)).await {
            Ok(outcome) => {
                if let Some((date, reason)) = outcome.failed_dates.into_iter().next() {
                    return DatePush::Failed(PmsError::Rejected(format!("{date}: {reason}")));
                }
                return DatePush::Ok(outcome.ok_count);
            }
            Err(PmsError::Unauthorized) => {
                auth_rejected.store(true, Ordering::SeqCst);
                return DatePush::AuthRejected;
            }
            Err(error) if error.is_retryable() && attempt < retries => {
                let delay = backoff_secs
                    .get(attempt as usize)
                    .copied()
                    .or_else(|| backoff_secs.last().copied())
                    .unwrap_or(1);
                tokio::time::sleep(Duration::from_secs(delay)).await;
                // a sibling date may have hit the auth wall while we slept
                if auth_rejected.load(Ordering::SeqCst) {
                    return DatePush::Failed(error);
                }
                attempt += 1;
            }
            Err(error) => return DatePush::Failed(error),
        }
    }
}

/// Folds per-property push reports into the run summary handed back to the
/// caller.
pub(crate) fn merge_reports(summary: &mut RunSummary, reports: &[PropertyPushReport]) {
    for report in reports {
        for (date, reason) in &report.failed_dates {
            summary.failed_dates.push((report.property_id.clone(), *date));
            summary.record(
                RunIssue::new(IssueKind::Transient, reason.clone())
                    .for_property(report.property_id.clone())
                    .on_date(*date),
            );
        }
        if report.credentials_invalid {
            summary.credentials_invalid.push(report.property_id.clone());
            summary.record(
                RunIssue::new(IssueKind::CredentialsInvalid, "pms credentials rejected")
                    .for_property(report.property_id.clone()),
            );
        }
        if let Some(error) = &report.error {
            summary.record(
                RunIssue::new(IssueKind::Transient, error.clone())
                    .for_property(report.property_id.clone()),
            );
        }
    }
}
