//! Inbound operations: everything the HTTP layer and the CLI call. Input is
//! validated at this boundary; repositories enforce tenancy and the domain
//! invariants underneath.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use priceye_core::{
    AutoPricingStatus, Booking, BookingId, Cents, EngineError, EntityRef, OverrideSource,
    PriceOverride, PricingRecommendation, PropertyId, RunSummary, TenantId,
};

use crate::context::{map_repo_error, EngineContext};
use crate::fanout::{merge_reports, RateFanOut};
use crate::horizon::HorizonGenerator;

/// One requested override cell.
#[derive(Clone, Debug)]
pub struct OverrideChange {
    pub date: NaiveDate,
    pub price: Cents,
    pub is_locked: bool,
    pub reason: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewBooking {
    pub start_date: NaiveDate,
    pub end_date_exclusive: NaiveDate,
    pub price_per_night: Cents,
    pub channel: String,
}

pub struct PricingService {
    ctx: Arc<EngineContext>,
    horizon: HorizonGenerator,
    fanout: RateFanOut,
}

impl PricingService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            horizon: HorizonGenerator::new(ctx.clone()),
            fanout: RateFanOut::new(ctx.clone()),
            ctx,
        }
    }

    /// Full apply path: generate the horizon, then fan the effective prices
    /// out to the PMS. Push failures land in the summary, never as errors.
    pub async fn apply_pricing_strategy(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
        force: bool,
    ) -> Result<RunSummary, EngineError> {
        let output = self.horizon.generate(tenant, entity, force).await?;
        let mut summary = output.summary;
        let reports = self.fanout.push_all(tenant, output.pushes).await;
        merge_reports(&mut summary, &reports);
        Ok(summary)
    }

    pub async fn get_price_overrides(
        &self,
        tenant: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PriceOverride>, EngineError> {
        if from >= to {
            return Err(EngineError::InputInvalid(format!(
                "empty range: {from} is not before {to}"
            )));
        }
        self.require_property(tenant, property_id).await?;
        self.ctx.overrides.list_range(tenant, property_id, from, to).await.map_err(map_repo_error)
    }

    pub async fn update_price_overrides(
        &self,
        tenant: &TenantId,
        property_id: &PropertyId,
        changes: Vec<OverrideChange>,
    ) -> Result<(), EngineError> {
        if changes.is_empty() {
            return Err(EngineError::InputInvalid("no override changes supplied".to_string()));
        }
        for change in &changes {
            if change.price <= 0 {
                return Err(EngineError::InputInvalid(format!(
                    "override price for {} must be positive",
                    change.date
                )));
            }
        }
        self.require_property(tenant, property_id).await?;

        let now = self.ctx.clock.now();
        let overrides = changes
            .into_iter()
            .map(|change| PriceOverride {
                property_id: property_id.clone(),
                date: change.date,
                price: change.price,
                is_locked: change.is_locked,
                reason: change.reason,
                source: OverrideSource::Manual,
                updated_at: now,
            })
            .collect();
        self.ctx
            .overrides
            .upsert_many(tenant, property_id, overrides)
            .await
            .map_err(map_repo_error)
    }

    pub async fn get_bookings_for_month(
        &self,
        tenant: &TenantId,
        property_id: &PropertyId,
        year: i32,
        month: u32,
    ) -> Result<Vec<Booking>, EngineError> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InputInvalid(format!("month {month} is out of range")));
        }
        self.require_property(tenant, property_id).await?;
        self.ctx
            .bookings
            .list_for_month(tenant, property_id, year, month)
            .await
            .map_err(map_repo_error)
    }

    pub async fn add_booking(
        &self,
        tenant: &TenantId,
        property_id: &PropertyId,
        request: NewBooking,
    ) -> Result<Booking, EngineError> {
        self.require_property(tenant, property_id).await?;
        let booking = Booking {
            id: BookingId(Uuid::new_v4().to_string()),
            property_id: property_id.clone(),
            start_date: request.start_date,
            end_date_exclusive: request.end_date_exclusive,
            price_per_night: request.price_per_night,
            channel: request.channel,
            booked_at: self.ctx.clock.now(),
        };
        booking.validate()?;
        self.ctx.bookings.insert(tenant, booking.clone()).await.map_err(map_repo_error)?;
        Ok(booking)
    }

    pub async fn get_recommendations(
        &self,
        tenant: &TenantId,
        property_id: &PropertyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricingRecommendation>, EngineError> {
        if from >= to {
            return Err(EngineError::InputInvalid(format!(
                "empty range: {from} is not before {to}"
            )));
        }
        self.require_property(tenant, property_id).await?;
        self.ctx
            .recommendations
            .list_range(tenant, property_id, from, to)
            .await
            .map_err(map_repo_error)
    }

    /// Status for an entity. An entity that never ran reports the idle,
    /// disabled default.
    pub async fn get_auto_pricing_status(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
    ) -> Result<AutoPricingStatus, EngineError> {
        self.require_entity(tenant, entity).await?;
        let found = self.ctx.statuses.find(tenant, entity).await.map_err(map_repo_error)?;
        Ok(found.unwrap_or_else(|| AutoPricingStatus::new(entity.clone(), tenant.clone(), false)))
    }

    pub async fn set_auto_pricing_enabled(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
        enabled: bool,
    ) -> Result<AutoPricingStatus, EngineError> {
        self.require_entity(tenant, entity).await?;
        let mut status = self
            .ctx
            .statuses
            .find(tenant, entity)
            .await
            .map_err(map_repo_error)?
            .unwrap_or_else(|| AutoPricingStatus::new(entity.clone(), tenant.clone(), false));
        status.enabled = enabled;
        self.ctx.statuses.save(status.clone()).await.map_err(map_repo_error)?;
        Ok(status)
    }

    async fn require_property(
        &self,
        tenant: &TenantId,
        property_id: &PropertyId,
    ) -> Result<(), EngineError> {
        self.ctx
            .properties
            .find(tenant, property_id)
            .await
            .map_err(map_repo_error)?
            .map(|_| ())
            .ok_or_else(|| EngineError::InputInvalid(format!("unknown property {}", property_id.0)))
    }

    async fn require_entity(
        &self,
        tenant: &TenantId,
        entity: &EntityRef,
    ) -> Result<(), EngineError> {
        match entity {
            EntityRef::Property(id) => self.require_property(tenant, id).await,
            EntityRef::Group(id) => self
                .ctx
                .groups
                .find(tenant, id)
                .await
                .map_err(map_repo_error)?
                .map(|_| ())
                .ok_or_else(|| EngineError::InputInvalid(format!("unknown group {}", id.0))),
        }
    }
}
