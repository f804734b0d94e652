//! Subscription plan tiers.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subscription level controlling content entitlement.
///
/// The canonical form is the school-facing label ("Escola Básica", ...).
/// The checkout-facing slugs (`basico`, `premium`, `corporativo`) parse into
/// the same variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanTier {
    #[serde(rename = "Escola Básica", alias = "basico")]
    EscolaBasica,
    #[serde(rename = "Escola Premium", alias = "premium")]
    EscolaPremium,
    #[serde(rename = "Rede de Ensino", alias = "corporativo")]
    RedeDeEnsino,
    /// A paid subscription whose price is not in the price table.
    #[serde(rename = "Unknown")]
    Unknown,
}

impl PlanTier {
    /// Tiers that can be bought through checkout, cheapest first.
    pub const PURCHASABLE: [PlanTier; 3] = [
        PlanTier::EscolaBasica,
        PlanTier::EscolaPremium,
        PlanTier::RedeDeEnsino,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PlanTier::EscolaBasica => "Escola Básica",
            PlanTier::EscolaPremium => "Escola Premium",
            PlanTier::RedeDeEnsino => "Rede de Ensino",
            PlanTier::Unknown => "Unknown",
        }
    }

    /// Checkout-facing identifier, `None` for [`PlanTier::Unknown`].
    pub fn slug(&self) -> Option<&'static str> {
        match self {
            PlanTier::EscolaBasica => Some("basico"),
            PlanTier::EscolaPremium => Some("premium"),
            PlanTier::RedeDeEnsino => Some("corporativo"),
            PlanTier::Unknown => None,
        }
    }

    /// Ordering used when a customer holds more than one active subscription.
    pub fn rank(&self) -> u8 {
        match self {
            PlanTier::Unknown => 0,
            PlanTier::EscolaBasica => 1,
            PlanTier::EscolaPremium => 2,
            PlanTier::RedeDeEnsino => 3,
        }
    }

    /// Fixed feature entitlements of the tier.
    pub fn features(&self) -> &'static [&'static str] {
        match self {
            PlanTier::EscolaBasica => &["cursos_basicos", "painel_aluno"],
            PlanTier::EscolaPremium => &[
                "cursos_basicos",
                "cursos_avancados",
                "painel_aluno",
                "gamificacao",
                "relatorios_professor",
            ],
            PlanTier::RedeDeEnsino => &[
                "cursos_basicos",
                "cursos_avancados",
                "painel_aluno",
                "gamificacao",
                "relatorios_professor",
                "gestao_multiescola",
                "suporte_dedicado",
            ],
            PlanTier::Unknown => &[],
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePlanTierError(pub String);

impl std::fmt::Display for ParsePlanTierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown plan tier: {}", self.0)
    }
}

impl std::error::Error for ParsePlanTierError {}

impl FromStr for PlanTier {
    type Err = ParsePlanTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Escola Básica" | "basico" => Ok(PlanTier::EscolaBasica),
            "Escola Premium" | "premium" => Ok(PlanTier::EscolaPremium),
            "Rede de Ensino" | "corporativo" => Ok(PlanTier::RedeDeEnsino),
            "Unknown" => Ok(PlanTier::Unknown),
            other => Err(ParsePlanTierError(other.to_string())),
        }
    }
}
