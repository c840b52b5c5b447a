//! The contextual brief handed to the adjuster: everything about one
//! (property, date) cell the model may reason over, rendered as a prompt
//! that demands a strict JSON answer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use priceye_core::{Cents, Strategy};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextualBrief {
    pub property_name: String,
    pub city: String,
    pub currency: String,
    pub date: NaiveDate,
    pub strategy: Strategy,
    /// Half-width of the allowed adjustment band, in percent of candidate.
    pub bound_pct: f64,
    /// Base nightly price in cents.
    pub base_price: Cents,
    /// Market demand score 0..=1 for the date, when known.
    pub demand_score: Option<f64>,
    /// Nearby events within the lookaround window, already summarized.
    pub events: Vec<String>,
    pub weather_summary: Option<String>,
    /// Competitor average daily rate snapshot in cents, when known.
    pub competitor_adr: Option<Cents>,
}

impl ContextualBrief {
    /// Renders the prompt. The candidate price is injected by the adjuster
    /// so the same brief can serve a retry with a revised candidate.
    pub fn render(&self, candidate: f64) -> String {
        let mut prompt = String::with_capacity(640);
        prompt.push_str(
            "You are a short-term rental revenue manager. Review the candidate \
             nightly price below and answer with a single JSON object, no prose: \
             {\"adjusted_price\": <number, cents>, \"confidence\": <0-100>, \
             \"rationale\": <string>, \"key_factors\": [<strings>]}.\n\n",
        );
        prompt.push_str(&format!(
            "Property: {} in {} ({})\nDate: {}\nStrategy: {}\n",
            self.property_name,
            self.city,
            self.currency,
            self.date,
            self.strategy.as_str(),
        ));
        prompt.push_str(&format!(
            "Base price: {} cents\nCandidate price: {candidate:.0} cents\n",
            self.base_price
        ));
        prompt.push_str(&format!(
            "Your adjusted_price must stay within {:.0}% of the candidate.\n",
            self.bound_pct
        ));
        if let Some(score) = self.demand_score {
            prompt.push_str(&format!("Market demand score: {score:.2} (0 to 1)\n"));
        }
        if let Some(adr) = self.competitor_adr {
            prompt.push_str(&format!("Competitor average daily rate: {adr} cents\n"));
        }
        if let Some(weather) = &self.weather_summary {
            prompt.push_str(&format!("Weather: {weather}\n"));
        }
        if self.events.is_empty() {
            prompt.push_str("Local events: none known\n");
        } else {
            prompt.push_str("Local events:\n");
            for event in &self.events {
                prompt.push_str(&format!("- {event}\n"));
            }
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use priceye_core::Strategy;

    use super::ContextualBrief;

    #[test]
    fn prompt_carries_the_inputs_and_the_bound() {
        let brief = ContextualBrief {
            property_name: "Loft".to_string(),
            city: "Lisbon".to_string(),
            currency: "EUR".to_string(),
            date: "2025-06-14".parse().expect("date"),
            strategy: Strategy::Balanced,
            bound_pct: 30.0,
            base_price: 10_000,
            demand_score: Some(0.9),
            events: vec!["Rock in Rio Lisboa".to_string()],
            weather_summary: None,
            competitor_adr: Some(14_500),
        };

        let prompt = brief.render(12_000.0);
        assert!(prompt.contains("Candidate price: 12000 cents"));
        assert!(prompt.contains("within 30% of the candidate"));
        assert!(prompt.contains("Rock in Rio Lisboa"));
        assert!(prompt.contains("balanced"));
    }
}
