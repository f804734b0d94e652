use edufin_common::{PlanInfo, PlanTier};

use crate::config::PricesConfig;

/// The one mapping between Stripe price identifiers and plan tiers.
#[derive(Debug, Clone)]
pub struct PriceTable {
    entries: Vec<(PlanTier, String)>,
}

impl PriceTable {
    pub fn new(prices: &PricesConfig) -> Self {
        Self {
            entries: vec![
                (PlanTier::EscolaBasica, prices.basico.clone()),
                (PlanTier::EscolaPremium, prices.premium.clone()),
                (PlanTier::RedeDeEnsino, prices.corporativo.clone()),
            ],
        }
    }

    /// Tier for a price id; unmapped prices are `Unknown`.
    pub fn tier_for_price(&self, price_id: &str) -> PlanTier {
        self.entries
            .iter()
            .find(|(_, id)| id == price_id)
            .map(|(tier, _)| *tier)
            .unwrap_or(PlanTier::Unknown)
    }

    pub fn contains_price(&self, price_id: &str) -> bool {
        self.entries.iter().any(|(_, id)| id == price_id)
    }

    pub fn plans(&self) -> Vec<PlanInfo> {
        self.entries
            .iter()
            .map(|(tier, price_id)| PlanInfo {
                tier: *tier,
                slug: tier.slug().unwrap_or_default().to_string(),
                features: tier.features().iter().map(|f| f.to_string()).collect(),
                price_id: price_id.clone(),
            })
            .collect()
    }
}
