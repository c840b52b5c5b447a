//! Horizon generator: prices one entity over `[today, today + H)` in the
//! property's local time. Model signals fan out first, the adjuster runs
//! quota-gated on the blended candidate, and the strategy resolver produces
//! the effective price that is persisted and handed to the fan-out writer.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use priceye_core::ensemble::{combine, SignalSet};
use priceye_core::strategy::{resolve_effective, resolve_member_sync};
use priceye_core::{
    DomainError, EngineError, EntityRef, FeatureVector, IssueKind, LlmSignal, PriceOverride,
    PricingRecommendation, Property, RunIssue, RunSummary, TenantId,
};
use priceye_models::ContextualBrief;
use priceye_pms::RateUpdate;

use crate::context::{map_repo_error, EngineContext};

/// Effective prices for one property, ready for the fan-out writer.
pub(crate) struct PropertyRates {
    pub property: Property,
    pub rates: Vec<RateUpdate>,
}

pub(crate) struct GenerationOutput {
    pub summary: RunSummary,
    pub pushes: Vec<PropertyRates>,
}

struct Cell {
    date: NaiveDate,
    recommendation: PricingRecommendation,
    /// Recommended effective price, before any locked override precedence.
    effective: i64,
    locked: bool,
}

pub struct HorizonGenerator {
    ctx: Arc<EngineContext>,
}

impl HorizonGenerator {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Runs generation without pushing to the PMS. Callers that want the
    /// full apply path go through `PricingService` or the scheduler.
    pub async fn run(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
        force: bool,
    ) -> Result<RunSummary, EngineError> {
        self.generate(tenant, entity, force).await.map(|output| output.summary)
    }

    pub(crate) async fn generate(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
        force: bool,
    ) -> Result<GenerationOutput, EngineError> {
        let (main, members) = self.resolve_entity(tenant, entity).await?;
        let main = Arc::new(main);

        let offset = local_offset(main.tz_offset_minutes);
        let now = self.ctx.clock.now();
        let today = now.with_timezone(&offset).date_naive();
        let start_of_today = start_of_local_day(today, offset, now);

        if !force {
            let latest = self
                .ctx
                .recommendations
                .latest_generated_at(tenant, &main.id)
                .await
                .map_err(map_repo_error)?;
            if latest.is_some_and(|generated_at| generated_at >= start_of_today) {
                debug!(
                    event_name = "horizon.already_generated",
                    property_id = %main.id.0,
                    "skipping same-day regeneration"
                );
                return Ok(GenerationOutput {
                    summary: RunSummary::empty(entity.clone()),
                    pushes: Vec::new(),
                });
            }
        }

        let horizon_end = today
            .checked_add_days(Days::new(self.ctx.config.horizon_days as u64))
            .ok_or_else(|| EngineError::InputInvalid("horizon end out of range".to_string()))?;
        let dates: Vec<NaiveDate> = (0..self.ctx.config.horizon_days)
            .filter_map(|i| today.checked_add_days(Days::new(i as u64)))
            .collect();

        let locked = Arc::new(
            self.locked_overrides(tenant, &main, today, horizon_end).await?,
        );
        let demand = Arc::new(self.demand_scores(&main, today, horizon_end).await?);
        let occupancy = self.occupancy_lag(tenant, &main, today).await?;

        let mut summary = RunSummary::empty(entity.clone());
        let (cells, llm_calls_used) = self
            .generate_cells(tenant, &main, today, &dates, &locked, &demand, occupancy, &mut summary)
            .await;
        summary.llm_calls_used = llm_calls_used;

        let mut recommendations = Vec::with_capacity(cells.len());
        let mut ai_overrides = Vec::new();
        let mut rates = Vec::with_capacity(cells.len());
        for cell in &cells {
            recommendations.push(cell.recommendation.clone());
            if cell.locked {
                summary.days_skipped_locked += 1;
                if let Some(override_row) = locked.get(&cell.date) {
                    rates.push(RateUpdate { date: cell.date, price: override_row.price });
                }
            } else {
                summary.days_generated += 1;
                ai_overrides.push(PriceOverride::ai(
                    main.id.clone(),
                    cell.date,
                    cell.effective,
                    "auto-pricing run",
                ));
                rates.push(RateUpdate { date: cell.date, price: cell.effective });
            }
        }

        self.ctx
            .recommendations
            .upsert_many(tenant, &main.id, recommendations.clone())
            .await
            .map_err(map_repo_error)?;
        if !ai_overrides.is_empty() {
            self.ctx
                .overrides
                .upsert_many(tenant, &main.id, ai_overrides)
                .await
                .map_err(map_repo_error)?;
        }

        let mut pushes =
            vec![PropertyRates { property: (*main).clone(), rates: rates.clone() }];

        for member in members {
            let member_push = self
                .apply_member_sync(tenant, &member, &cells, today, horizon_end, &recommendations)
                .await?;
            pushes.push(member_push);
        }

        info!(
            event_name = "horizon.generated",
            entity_id = entity.entity_id(),
            days_generated = summary.days_generated,
            days_skipped_locked = summary.days_skipped_locked,
            llm_calls_used = summary.llm_calls_used,
            "horizon run complete"
        );

        Ok(GenerationOutput { summary, pushes })
    }

    async fn resolve_entity(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
    ) -> Result<(Property, Vec<Property>), EngineError> {
        match entity {
            EntityRef::Property(id) => {
                let property = self
                    .ctx
                    .properties
                    .find(tenant, id)
                    .await
                    .map_err(map_repo_error)?
                    .ok_or_else(|| {
                        EngineError::InputInvalid(format!("unknown property {}", id.0))
                    })?;
                if !property.pricing_enabled {
                    return Err(EngineError::InputInvalid(format!(
                        "pricing is disabled for property {}",
                        id.0
                    )));
                }
                Ok((property, Vec::new()))
            }
            EntityRef::Group(id) => {
                let group = self
                    .ctx
                    .groups
                    .find(tenant, id)
                    .await
                    .map_err(map_repo_error)?
                    .ok_or_else(|| EngineError::InputInvalid(format!("unknown group {}", id.0)))?;
                let main_id = group.main_property_id.clone().ok_or(EngineError::Domain(
                    DomainError::GroupMissingMain { group_id: group.id.clone() },
                ))?;
                let main = self
                    .ctx
                    .properties
                    .find(tenant, &main_id)
                    .await
                    .map_err(map_repo_error)?
                    .ok_or_else(|| {
                        EngineError::InputInvalid(format!(
                            "group {} names a missing main property",
                            id.0
                        ))
                    })?;

                let mut members = Vec::new();
                if group.sync_prices {
                    for member_id in &group.member_property_ids {
                        if member_id == &main_id {
                            continue;
                        }
                        if let Some(member) = self
                            .ctx
                            .properties
                            .find(tenant, member_id)
                            .await
                            .map_err(map_repo_error)?
                        {
                            members.push(member);
                        }
                    }
                }
                Ok((main, members))
            }
        }
    }

    async fn locked_overrides(
        &self,
        tenant: &TenantId,
        property: &Property,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<NaiveDate, PriceOverride>, EngineError> {
        let rows = self
            .ctx
            .overrides
            .list_range(tenant, &property.id, from, to)
            .await
            .map_err(map_repo_error)?;
        Ok(rows.into_iter().filter(|row| row.is_locked).map(|row| (row.date, row)).collect())
    }

    async fn demand_scores(
        &self,
        property: &Property,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<HashMap<NaiveDate, f64>, EngineError> {
        let rows = self
            .ctx
            .forecasts
            .list_range(&property.city, &property.property_type, from, to)
            .await
            .map_err(map_repo_error)?;
        Ok(rows
            .into_iter()
            .map(|forecast| (forecast.forecast_date, forecast.normalized_score()))
            .collect())
    }

    /// Fraction of the trailing 30 nights that were booked.
    async fn occupancy_lag(
        &self,
        tenant: &TenantId,
        property: &Property,
        today: NaiveDate,
    ) -> Result<f64, EngineError> {
        let window_start = today
            .checked_sub_days(Days::new(30))
            .unwrap_or(today);
        let bookings = self
            .ctx
            .bookings
            .list_in_range(tenant, &property.id, window_start, today)
            .await
            .map_err(map_repo_error)?;
        let mut nights = 0i64;
        for booking in &bookings {
            let start = booking.start_date.max(window_start);
            let end = booking.end_date_exclusive.min(today);
            if end > start {
                nights += (end - start).num_days();
            }
        }
        Ok((nights as f64 / 30.0).clamp(0.0, 1.0))
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate_cells(
        &self,
        tenant: &TenantId,
        main: &Arc<Property>,
        today: NaiveDate,
        dates: &[NaiveDate],
        locked: &Arc<HashMap<NaiveDate, PriceOverride>>,
        demand: &Arc<HashMap<NaiveDate, f64>>,
        occupancy: f64,
        summary: &mut RunSummary,
    ) -> (Vec<Cell>, u32) {
        let llm_semaphore = Arc::new(Semaphore::new(self.ctx.config.llm_parallelism));
        let model_semaphore = Arc::new(Semaphore::new(self.ctx.config.model_parallelism));
        let quota_blocked = Arc::new(AtomicBool::new(false));
        let llm_calls = Arc::new(AtomicU32::new(0));
        let issues = Arc::new(std::sync::Mutex::new(Vec::<RunIssue>::new()));

        let mut join_set: JoinSet<Cell> = JoinSet::new();
        for &date in dates {
            let ctx = self.ctx.clone();
            let main = main.clone();
            let tenant = tenant.clone();
            let locked = locked.clone();
            let demand = demand.clone();
            let llm_semaphore = llm_semaphore.clone();
            let model_semaphore = model_semaphore.clone();
            let quota_blocked = quota_blocked.clone();
            let llm_calls = llm_calls.clone();
            let issues = issues.clone();

            join_set.spawn(async move {
                generate_one_cell(
                    ctx,
                    tenant,
                    main,
                    today,
                    date,
                    locked.contains_key(&date),
                    demand.get(&date).copied(),
                    occupancy,
                    llm_semaphore,
                    model_semaphore,
                    quota_blocked,
                    llm_calls,
                    issues,
                )
                .await
            });
        }

        let deadline = Duration::from_secs(self.ctx.config.per_entity_deadline_secs);
        let started = tokio::time::Instant::now();
        let mut cells = Vec::with_capacity(dates.len());
        loop {
            let remaining = deadline.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, join_set.join_next()).await {
                Ok(Some(Ok(cell))) => cells.push(cell),
                Ok(Some(Err(join_error))) => {
                    summary.record(RunIssue::new(
                        IssueKind::Transient,
                        format!("pricing task failed: {join_error}"),
                    ));
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    warn!(
                        event_name = "horizon.deadline_exceeded",
                        property_id = %main.id.0,
                        "persisting the dates generated so far"
                    );
                    join_set.abort_all();
                    summary.record(
                        RunIssue::new(IssueKind::Transient, "entity deadline exceeded")
                            .for_property(main.id.clone()),
                    );
                    break;
                }
            }
        }
        cells.sort_by_key(|cell| cell.date);

        for issue in issues.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).drain(..) {
            summary.record(issue);
        }
        (cells, llm_calls.load(Ordering::SeqCst))
    }

    async fn apply_member_sync(
        &self,
        tenant: &TenantId,
        member: &Property,
        cells: &[Cell],
        from: NaiveDate,
        to: NaiveDate,
        main_recommendations: &[PricingRecommendation],
    ) -> Result<PropertyRates, EngineError> {
        let member_locked = self.locked_overrides(tenant, member, from, to).await?;

        let mut recommendations = Vec::with_capacity(cells.len());
        let mut ai_overrides = Vec::new();
        let mut rates = Vec::with_capacity(cells.len());
        for (cell, main_row) in cells.iter().zip(main_recommendations) {
            let synced = resolve_member_sync(member, cell.effective, None);
            let mut row = main_row.clone();
            row.property_id = member.id.clone();
            row.price_recommended = synced.price;
            recommendations.push(row);

            if let Some(locked_row) = member_locked.get(&cell.date) {
                rates.push(RateUpdate { date: cell.date, price: locked_row.price });
            } else {
                ai_overrides.push(PriceOverride::ai(
                    member.id.clone(),
                    cell.date,
                    synced.price,
                    "synced from group main property",
                ));
                rates.push(RateUpdate { date: cell.date, price: synced.price });
            }
        }

        self.ctx
            .recommendations
            .upsert_many(tenant, &member.id, recommendations)
            .await
            .map_err(map_repo_error)?;
        if !ai_overrides.is_empty() {
            self.ctx
                .overrides
                .upsert_many(tenant, &member.id, ai_overrides)
                .await
                .map_err(map_repo_error)?;
        }

        Ok(PropertyRates { property: member.clone(), rates })
    }
}

#[allow(clippy::too_many_arguments)]
async fn generate_one_cell(
    ctx: Arc<EngineContext>,
    tenant: TenantId,
    property: Arc<Property>,
    today: NaiveDate,
    date: NaiveDate,
    locked: bool,
    demand_score: Option<f64>,
    occupancy: f64,
    llm_semaphore: Arc<Semaphore>,
    model_semaphore: Arc<Semaphore>,
    quota_blocked: Arc<AtomicBool>,
    llm_calls: Arc<AtomicU32>,
    issues: Arc<std::sync::Mutex<Vec<RunIssue>>>,
) -> Cell {
    let mut features = FeatureVector::new(today, date).with_occupancy_lag(occupancy);
    if let Some(score) = demand_score {
        features = features.with_market_demand(score);
    }

    let mut model_versions = BTreeMap::new();
    let (prophet, xgboost, neural_net) = {
        let _permit = model_semaphore.acquire().await;
        (
            ctx.runner.predict_demand(&property.id, &features).await,
            ctx.runner.predict_price_xgb(&property.id, &features).await,
            ctx.runner.predict_price_nn(&property.id, &features).await,
        )
    };
    if let Some(prediction) = &prophet {
        model_versions.insert("demand".to_string(), prediction.version.clone());
    }
    if let Some(prediction) = &xgboost {
        model_versions.insert("xgboost".to_string(), prediction.version.clone());
    }
    if let Some(prediction) = &neural_net {
        model_versions.insert("neural_net".to_string(), prediction.version.clone());
    }

    let mut signals = SignalSet {
        demand_score,
        prophet_price: prophet.as_ref().map(|p| p.price),
        xgboost_price: xgboost.as_ref().map(|p| p.price),
        neural_net_price: neural_net.as_ref().map(|p| p.price),
        llm: None,
    };

    let base = property.base_price as f64;
    let weights = ctx.config.ensemble_weights;
    let candidate = combine(base, &signals, &weights);

    // The adjuster only runs when a model signal exists and quota remains;
    // a run with nothing to adjust spends nothing.
    let mut llm_price = None;
    if !locked && !candidate.contributors.is_empty() && !quota_blocked.load(Ordering::SeqCst) {
        let _permit = llm_semaphore.acquire().await;
        match ctx.quotas.try_reserve(&tenant, 1).await {
            Ok(true) => {
                llm_calls.fetch_add(1, Ordering::SeqCst);
                let brief = ContextualBrief {
                    property_name: property.name.clone(),
                    city: property.city.clone(),
                    currency: property.currency.clone(),
                    date,
                    strategy: property.strategy,
                    bound_pct: ctx.config.llm_bound_pct,
                    base_price: property.base_price,
                    demand_score,
                    events: Vec::new(),
                    weather_summary: None,
                    competitor_adr: None,
                };
                let adjusted = ctx.adjuster.adjust(candidate.price, &brief).await;
                if adjusted.available {
                    llm_price = Some(adjusted.price);
                    signals.llm = Some(LlmSignal {
                        price: adjusted.price,
                        confidence: Some(adjusted.confidence),
                        rationale: adjusted.rationale,
                        key_factors: adjusted.key_factors,
                    });
                } else {
                    push_issue(
                        &issues,
                        RunIssue::new(IssueKind::AdjusterUnavailable, adjusted.rationale)
                            .for_property(property.id.clone())
                            .on_date(date),
                    );
                }
            }
            Ok(false) => {
                if !quota_blocked.swap(true, Ordering::SeqCst) {
                    push_issue(
                        &issues,
                        RunIssue::new(
                            IssueKind::QuotaExhausted,
                            "ai quota exhausted; continuing with model signals only",
                        )
                        .for_property(property.id.clone()),
                    );
                }
            }
            Err(error) => {
                push_issue(
                    &issues,
                    RunIssue::new(IssueKind::Persistence, error.to_string())
                        .for_property(property.id.clone())
                        .on_date(date),
                );
            }
        }
    }

    let combined = combine(base, &signals, &weights);
    let effective = resolve_effective(&property, combined.price, None, &ctx.config.strategy_bands);

    // The stored recommendation is the raw blend; strategy bands and the
    // floor/ceiling shape only the applied price.
    let recommendation = PricingRecommendation {
        property_id: property.id.clone(),
        date,
        price_prophet: combined.demand_price.map(|p| p.round() as i64),
        price_xgboost: signals.xgboost_price.map(|p| p.round() as i64),
        price_nn: signals.neural_net_price.map(|p| p.round() as i64),
        price_gpt: llm_price.map(|p| p.round() as i64),
        price_recommended: combined.price.round() as i64,
        confidence_score: combined.confidence,
        explanation: combined.explanation,
        key_factors: combined.key_factors,
        model_versions,
        generated_at: ctx.clock.now(),
    };

    Cell { date, recommendation, effective: effective.price, locked }
}

fn push_issue(issues: &Arc<std::sync::Mutex<Vec<RunIssue>>>, issue: RunIssue) {
    issues.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(issue);
}

pub(crate) fn local_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

fn start_of_local_day(
    today: NaiveDate,
    offset: FixedOffset,
    fallback: DateTime<Utc>,
) -> DateTime<Utc> {
    today
        .and_time(NaiveTime::MIN)
        .and_local_timezone(offset)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(fallback)
}
