//! Strategy resolver: turns a raw ensemble recommendation into the
//! effective nightly price by applying precedence (locked manual > manual >
//! AI > base), the host's strategy band, floor/ceiling clamps, and group
//! price synchronization.

use serde::{Deserialize, Serialize};

use crate::domain::price_override::PriceOverride;
use crate::domain::property::{Cents, Property, Strategy};

/// Allowed deviation from the base price per risk posture, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyBands {
    pub prudent_pct: f64,
    pub balanced_pct: f64,
    pub aggressive_pct: f64,
}

impl Default for StrategyBands {
    fn default() -> Self {
        Self { prudent_pct: 15.0, balanced_pct: 30.0, aggressive_pct: 50.0 }
    }
}

impl StrategyBands {
    pub fn deviation(&self, strategy: Strategy) -> f64 {
        let pct = match strategy {
            Strategy::Prudent => self.prudent_pct,
            Strategy::Balanced => self.balanced_pct,
            Strategy::Aggressive => self.aggressive_pct,
        };
        pct / 100.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    LockedOverride,
    Recommendation,
    GroupSync,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectivePrice {
    pub price: Cents,
    pub source: PriceSource,
    /// The strategy band cut the recommendation.
    pub band_limited: bool,
    /// The floor/ceiling clamp moved the price.
    pub bound_limited: bool,
}

/// Effective price for a property's own recommendation. A locked override
/// wins outright; otherwise the recommendation is pulled into the strategy
/// band around base, then clamped into `[floor, ceiling]`, then rounded to
/// whole cents. This is the only place a blended price becomes an integer.
pub fn resolve_effective(
    property: &Property,
    recommended: f64,
    locked_override: Option<&PriceOverride>,
    bands: &StrategyBands,
) -> EffectivePrice {
    if let Some(locked) = locked_override {
        debug_assert!(locked.is_locked);
        return EffectivePrice {
            price: locked.price,
            source: PriceSource::LockedOverride,
            band_limited: false,
            bound_limited: false,
        };
    }

    let base = property.base_price as f64;
    let deviation = bands.deviation(property.strategy);
    let band_low = base * (1.0 - deviation);
    let band_high = base * (1.0 + deviation);
    let banded = recommended.clamp(band_low, band_high);
    let band_limited = banded != recommended;

    let (bounded, bound_limited) = clamp_bounds(banded, property.floor_price, property.ceiling_price);

    EffectivePrice {
        price: bounded.round() as Cents,
        source: PriceSource::Recommendation,
        band_limited,
        bound_limited,
    }
}

/// Effective price for a sync-group member: carries the main property's
/// effective price, bypassing the member's own band but still respecting its
/// floor and ceiling. A locked override on the member wins here too.
pub fn resolve_member_sync(
    member: &Property,
    main_effective: Cents,
    locked_override: Option<&PriceOverride>,
) -> EffectivePrice {
    if let Some(locked) = locked_override {
        debug_assert!(locked.is_locked);
        return EffectivePrice {
            price: locked.price,
            source: PriceSource::LockedOverride,
            band_limited: false,
            bound_limited: false,
        };
    }

    let (bounded, bound_limited) =
        clamp_bounds(main_effective as f64, member.floor_price, member.ceiling_price);

    EffectivePrice {
        price: bounded.round() as Cents,
        source: PriceSource::GroupSync,
        band_limited: false,
        bound_limited,
    }
}

fn clamp_bounds(price: f64, floor: Cents, ceiling: Option<Cents>) -> (f64, bool) {
    let mut bounded = price.max(floor as f64);
    if let Some(ceiling) = ceiling {
        bounded = bounded.min(ceiling as f64);
    }
    (bounded, bounded != price)
}
