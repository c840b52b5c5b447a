//! Auto-pricing scheduler: one logical daily tick per tenant at local dawn.
//! Per-entity failures are recorded on the persisted status row and never
//! abort the tick; the same property is never generated by two runs at
//! once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Timelike};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use priceye_core::{AutoPricingStatus, EngineError, EntityRef, RunState, RunSummary, TenantId};

use crate::context::{map_repo_error, EngineContext};
use crate::fanout::{merge_reports, RateFanOut};
use crate::horizon::{local_offset, HorizonGenerator};

#[derive(Clone, Debug)]
pub struct EntityTickResult {
    pub entity: EntityRef,
    pub state: RunState,
    pub reason: Option<String>,
    pub summary: Option<RunSummary>,
}

#[derive(Clone, Debug)]
pub struct TickReport {
    pub tenant_id: TenantId,
    pub entities: Vec<EntityTickResult>,
}

struct SchedulerInner {
    ctx: Arc<EngineContext>,
    horizon: HorizonGenerator,
    fanout: RateFanOut,
    /// Property ids currently being generated, across all tenants.
    in_flight: Mutex<HashSet<String>>,
    /// Tenant -> local date of the last automatic tick.
    ticked_on: Mutex<HashMap<String, NaiveDate>>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                horizon: HorizonGenerator::new(ctx.clone()),
                fanout: RateFanOut::new(ctx.clone()),
                ctx,
                in_flight: Mutex::new(HashSet::new()),
                ticked_on: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Runs one tick for every tenant with enabled entities.
    pub async fn tick_all(&self, force: bool) -> Result<Vec<TickReport>, EngineError> {
        let tenants = self
            .inner
            .ctx
            .statuses
            .list_tenants_with_enabled_entities()
            .await
            .map_err(map_repo_error)?;

        let semaphore = Arc::new(Semaphore::new(self.inner.ctx.config.global_parallelism.max(1)));
        let mut join_set: JoinSet<TickReport> = JoinSet::new();
        for tenant in tenants {
            let scheduler = self.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                match scheduler.tick_tenant(&tenant, force).await {
                    Ok(report) => report,
                    Err(tick_error) => {
                        error!(
                            event_name = "scheduler.tenant_tick_failed",
                            tenant_id = %tenant.0,
                            error = %tick_error,
                            "tenant tick aborted"
                        );
                        TickReport { tenant_id: tenant, entities: Vec::new() }
                    }
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            if let Ok(report) = joined {
                reports.push(report);
            }
        }
        reports.sort_by(|a, b| a.tenant_id.0.cmp(&b.tenant_id.0));
        Ok(reports)
    }

    /// One tick for one tenant: every enabled entity runs once, bounded by
    /// the per-tenant parallelism.
    pub async fn tick_tenant(
        &self,
        tenant: &TenantId,
        force: bool,
    ) -> Result<TickReport, EngineError> {
        let statuses =
            self.inner.ctx.statuses.list_enabled(tenant).await.map_err(map_repo_error)?;
        info!(
            event_name = "scheduler.tick_started",
            tenant_id = %tenant.0,
            entities = statuses.len(),
            "starting tenant tick"
        );

        let semaphore = Arc::new(Semaphore::new(self.inner.ctx.config.tenant_parallelism.max(1)));
        let mut join_set: JoinSet<EntityTickResult> = JoinSet::new();
        for status in statuses {
            let scheduler = self.clone();
            let tenant = tenant.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await;
                scheduler.run_entity(&tenant, status, force).await
            });
        }

        let mut entities = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => entities.push(result),
                Err(join_error) => {
                    error!(
                        event_name = "scheduler.entity_task_failed",
                        tenant_id = %tenant.0,
                        error = %join_error,
                        "entity task panicked"
                    );
                }
            }
        }
        entities.sort_by(|a, b| a.entity.entity_id().cmp(b.entity.entity_id()));
        Ok(TickReport { tenant_id: tenant.clone(), entities })
    }

    async fn run_entity(
        &self,
        tenant: &TenantId,
        mut status: AutoPricingStatus,
        force: bool,
    ) -> EntityTickResult {
        let entity = status.entity.clone();

        let properties = match self.entity_property_ids(tenant, &entity).await {
            Ok(ids) => ids,
            Err(run_error) => {
                return self.finish(tenant, status, RunState::Failed, Some(run_error.to_string()), None).await;
            }
        };
        let main_offset_minutes = properties.first().map(|(_, tz)| *tz).unwrap_or(0);

        // Same-local-day skip. The horizon generator re-checks through
        // `generated_at`, this check just avoids starting work at all.
        if !force {
            let offset = local_offset(main_offset_minutes);
            let today = self.inner.ctx.clock.now().with_timezone(&offset).date_naive();
            if status
                .last_run_at
                .is_some_and(|last| last.with_timezone(&offset).date_naive() == today)
            {
                return self
                    .finish(tenant, status, RunState::Skipped, Some("already ran today".to_string()), None)
                    .await;
            }
        }

        let ids: Vec<String> = properties.iter().map(|(id, _)| id.clone()).collect();
        let _claim = self.claim(ids).await;

        if status.transition_to(RunState::Running).is_err() {
            // stale state from a crash mid-run
            status.run_state = RunState::Running;
        }
        if let Err(save_error) = self.inner.ctx.statuses.save(status.clone()).await {
            warn!(
                event_name = "scheduler.status_save_failed",
                entity_id = entity.entity_id(),
                error = %save_error,
                "could not persist running state"
            );
        }

        match self.inner.horizon.generate(tenant, &entity, force).await {
            Ok(output) => {
                let mut summary = output.summary;
                let reports = self.inner.fanout.push_all(tenant, output.pushes).await;
                merge_reports(&mut summary, &reports);

                if summary.days_generated == 0 && summary.days_skipped_locked == 0 {
                    self.finish(
                        tenant,
                        status,
                        RunState::Skipped,
                        Some("already generated today".to_string()),
                        Some(summary),
                    )
                    .await
                } else {
                    status.last_run_at = Some(self.inner.ctx.clock.now());
                    self.finish(tenant, status, RunState::Succeeded, None, Some(summary)).await
                }
            }
            Err(run_error) => {
                self.finish(tenant, status, RunState::Failed, Some(run_error.to_string()), None)
                    .await
            }
        }
    }

    async fn finish(
        &self,
        _tenant: &TenantId,
        mut status: AutoPricingStatus,
        state: RunState,
        reason: Option<String>,
        summary: Option<RunSummary>,
    ) -> EntityTickResult {
        let entity = status.entity.clone();
        if status.transition_to(state.clone()).is_err() {
            status.run_state = state.clone();
        }
        status.last_error = reason.clone();
        if let Err(save_error) = self.inner.ctx.statuses.save(status).await {
            warn!(
                event_name = "scheduler.status_save_failed",
                entity_id = entity.entity_id(),
                error = %save_error,
                "could not persist run state"
            );
        }
        EntityTickResult { entity, state, reason, summary }
    }

    async fn entity_property_ids(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
    ) -> Result<Vec<(String, i32)>, EngineError> {
        match entity {
            EntityRef::Property(id) => {
                let property = self
                    .inner
                    .ctx
                    .properties
                    .find(tenant, id)
                    .await
                    .map_err(map_repo_error)?
                    .ok_or_else(|| {
                        EngineError::InputInvalid(format!("unknown property {}", id.0))
                    })?;
                Ok(vec![(property.id.0.clone(), property.tz_offset_minutes)])
            }
            EntityRef::Group(id) => {
                let group = self
                    .inner
                    .ctx
                    .groups
                    .find(tenant, id)
                    .await
                    .map_err(map_repo_error)?
                    .ok_or_else(|| EngineError::InputInvalid(format!("unknown group {}", id.0)))?;
                let mut ids = Vec::new();
                for member_id in &group.member_property_ids {
                    if let Some(member) = self
                        .inner
                        .ctx
                        .properties
                        .find(tenant, member_id)
                        .await
                        .map_err(map_repo_error)?
                    {
                        // main property first: its offset drives the local day
                        if group.main_property_id.as_ref() == Some(member_id) {
                            ids.insert(0, (member.id.0.clone(), member.tz_offset_minutes));
                        } else {
                            ids.push((member.id.0.clone(), member.tz_offset_minutes));
                        }
                    }
                }
                Ok(ids)
            }
        }
    }

    /// Claims the property ids for exclusive generation, waiting until no
    /// other run holds any of them.
    async fn claim(&self, ids: Vec<String>) -> ClaimGuard {
        loop {
            {
                let mut in_flight = self
                    .inner
                    .in_flight
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if ids.iter().all(|id| !in_flight.contains(id)) {
                    for id in &ids {
                        in_flight.insert(id.clone());
                    }
                    return ClaimGuard { inner: self.inner.clone(), ids };
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Long-running loop firing one tick per tenant per local day at the
    /// configured dawn hour. Checks once a minute.
    pub async fn run_daily(&self) {
        let tick_hour = self.inner.ctx.config.default_local_tick_hour;
        loop {
            if let Err(loop_error) = self.fire_due_tenants(tick_hour).await {
                error!(
                    event_name = "scheduler.daily_loop_error",
                    error = %loop_error,
                    "daily scheduler pass failed"
                );
            }
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }

    async fn fire_due_tenants(&self, tick_hour: u32) -> Result<(), EngineError> {
        let tenants = self
            .inner
            .ctx
            .statuses
            .list_tenants_with_enabled_entities()
            .await
            .map_err(map_repo_error)?;

        for tenant in tenants {
            let offset_minutes = self.tenant_offset_minutes(&tenant).await;
            let offset = local_offset(offset_minutes);
            let local_now = self.inner.ctx.clock.now().with_timezone(&offset);
            if local_now.hour() != tick_hour {
                continue;
            }
            let today = local_now.date_naive();
            {
                let mut ticked = self
                    .inner
                    .ticked_on
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if ticked.get(&tenant.0) == Some(&today) {
                    continue;
                }
                ticked.insert(tenant.0.clone(), today);
            }
            if let Err(tick_error) = self.tick_tenant(&tenant, false).await {
                error!(
                    event_name = "scheduler.tenant_tick_failed",
                    tenant_id = %tenant.0,
                    error = %tick_error,
                    "scheduled tick failed"
                );
            }
        }
        Ok(())
    }

    /// The tenant's local offset, taken from the first enabled entity's
    /// property. Tenants span one market in practice.
    async fn tenant_offset_minutes(&self, tenant: &TenantId) -> i32 {
        let Ok(statuses) = self.inner.ctx.statuses.list_enabled(tenant).await else {
            return 0;
        };
        for status in statuses {
            if let Ok(ids) = self.entity_property_ids(tenant, &status.entity).await {
                if let Some((_, offset)) = ids.first() {
                    return *offset;
                }
            }
        }
        0
    }
}

struct ClaimGuard {
    inner: Arc<SchedulerInner>,
    ids: Vec<String>,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let mut in_flight =
            self.inner.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for id in &self.ids {
            in_flight.remove(id);
        }
    }
}
