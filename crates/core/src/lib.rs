pub mod config;
pub mod domain;
pub mod ensemble;
pub mod errors;
pub mod features;
pub mod strategy;

pub use domain::booking::{Booking, BookingId};
pub use domain::forecast::DemandForecast;
pub use domain::group::{Group, GroupId};
pub use domain::integration::{IntegrationId, PmsIntegration};
pub use domain::price_override::{OverrideSource, PriceOverride};
pub use domain::property::{Cents, Property, PropertyId, Strategy, TenantId};
pub use domain::quota::AiQuotaCounter;
pub use domain::recommendation::PricingRecommendation;
pub use domain::status::{AutoPricingStatus, EntityRef, EntityType, RunState};
pub use domain::summary::{IssueKind, RunIssue, RunSummary};
pub use ensemble::{CombinedRecommendation, EnsembleWeights, LlmSignal, SignalSet};
pub use errors::{ApiError, DomainError, EngineError};
pub use features::FeatureVector;
pub use strategy::{EffectivePrice, PriceSource, StrategyBands};
