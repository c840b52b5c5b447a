//! Ensemble combiner: merges the independent pricing signals for one
//! (property, date) cell into a single recommendation with a confidence
//! score and an explanation. Pure arithmetic; nothing here touches I/O.

use serde::{Deserialize, Serialize};

/// Default blend weights. Renormalized over the signals actually present,
/// so a missing model redistributes its weight instead of dragging the
/// blend toward zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub demand_derived: f64,
    pub xgboost: f64,
    pub neural_net: f64,
    pub llm: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self { demand_derived: 0.15, xgboost: 0.35, neural_net: 0.30, llm: 0.20 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    DemandDerived,
    Xgboost,
    NeuralNet,
    Llm,
}

impl SignalKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DemandDerived => "demand forecast",
            Self::Xgboost => "gradient-boosted model",
            Self::NeuralNet => "neural network",
            Self::Llm => "context adjuster",
        }
    }
}

/// Successful adjuster output. Adjuster failure never reaches the combiner:
/// the caller drops the signal instead.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmSignal {
    pub price: f64,
    /// 0..=100, when the adjuster reported one.
    pub confidence: Option<f64>,
    pub rationale: String,
    pub key_factors: Vec<String>,
}

/// Raw per-date signals as gathered by the horizon generator. Any of them
/// may be absent; "absent" is a normal state, not an error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalSet {
    /// Market demand score normalized to 0..=1.
    pub demand_score: Option<f64>,
    /// Raw demand-model price, used when no market forecast exists.
    pub prophet_price: Option<f64>,
    pub xgboost_price: Option<f64>,
    pub neural_net_price: Option<f64>,
    pub llm: Option<LlmSignal>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CombinedRecommendation {
    /// Blended price in cents, rounded to 2 decimals. Final rounding to a
    /// whole cent happens at the strategy clamp.
    pub price: f64,
    /// 0..=100.
    pub confidence: f64,
    pub explanation: String,
    pub key_factors: Vec<String>,
    pub contributors: Vec<SignalKind>,
    /// The demand-derived price that entered the blend, for persistence.
    pub demand_price: Option<f64>,
}

/// Derives a price from the market demand score around the property's base
/// price. Tiers: score >= 0.8 maps linearly onto +20%..+30%; 0.5..0.8 onto
/// 0..+15%; below 0.5 onto -10%..-30%.
pub fn demand_derived_price(base_price: f64, demand_score: f64) -> f64 {
    let score = demand_score.clamp(0.0, 1.0);
    let pct = if score >= 0.8 {
        0.20 + (score - 0.8) / 0.2 * 0.10
    } else if score >= 0.5 {
        (score - 0.5) / 0.3 * 0.15
    } else {
        -(0.10 + (0.5 - score) / 0.5 * 0.20)
    };
    (base_price * (1.0 + pct)).max(0.0)
}

pub fn combine(
    base_price: f64,
    signals: &SignalSet,
    weights: &EnsembleWeights,
) -> CombinedRecommendation {
    let demand_price = match (signals.demand_score, signals.prophet_price) {
        (Some(score), _) => Some(demand_derived_price(base_price, score)),
        (None, Some(raw)) => Some(raw),
        (None, None) => None,
    };

    let mut present: Vec<(SignalKind, f64, f64)> = Vec::with_capacity(4);
    if let Some(price) = demand_price {
        present.push((SignalKind::DemandDerived, weights.demand_derived, price));
    }
    if let Some(price) = signals.xgboost_price {
        present.push((SignalKind::Xgboost, weights.xgboost, price));
    }
    if let Some(price) = signals.neural_net_price {
        present.push((SignalKind::NeuralNet, weights.neural_net, price));
    }
    if let Some(llm) = &signals.llm {
        present.push((SignalKind::Llm, weights.llm, llm.price));
    }

    if present.is_empty() {
        return CombinedRecommendation {
            price: base_price,
            confidence: 0.0,
            explanation: "No pricing signals were available; holding the base price.".to_string(),
            key_factors: Vec::new(),
            contributors: Vec::new(),
            demand_price: None,
        };
    }

    let weight_sum: f64 = present.iter().map(|(_, w, _)| w).sum();
    let blended: f64 = present.iter().map(|(_, w, p)| (w / weight_sum) * p).sum();
    let price = (blended * 100.0).round() / 100.0;

    let prices: Vec<f64> = present.iter().map(|(_, _, p)| *p).collect();
    let mut confidence = 50.0 + 10.0 * present.len() as f64;
    confidence += cv_adjustment(&prices);

    if let Some(llm_confidence) = signals.llm.as_ref().and_then(|llm| llm.confidence) {
        confidence = (confidence + llm_confidence) / 2.0;
    }
    let confidence = confidence.clamp(0.0, 100.0);

    let contributors: Vec<SignalKind> = present.iter().map(|(kind, _, _)| *kind).collect();
    let mut explanation = format!(
        "Blended from {}.",
        contributors.iter().map(|kind| kind.label()).collect::<Vec<_>>().join(", ")
    );
    let mut key_factors = Vec::new();
    if let Some(llm) = &signals.llm {
        if !llm.rationale.is_empty() {
            explanation.push(' ');
            explanation.push_str(&llm.rationale);
        }
        key_factors.extend(llm.key_factors.iter().cloned());
    }

    CombinedRecommendation { price, confidence, explanation, key_factors, contributors, demand_price }
}

/// Coefficient-of-variation adjustment: tight agreement between the models
/// raises confidence, wide disagreement lowers it.
fn cv_adjustment(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    let mean: f64 = prices.iter().sum::<f64>() / prices.len() as f64;
    if mean <= f64::EPSILON {
        return 0.0;
    }
    let variance: f64 =
        prices.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / prices.len() as f64;
    let cv = variance.sqrt() / mean;

    if cv < 0.1 {
        20.0
    } else if cv < 0.2 {
        10.0
    } else if cv > 0.3 {
        -20.0
    } else {
        0.0
    }
}
