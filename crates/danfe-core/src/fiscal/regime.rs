//! Taxpayer regimes.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Profit method of a normal-regime taxpayer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalRegime {
    /// Lucro Real: non-cumulative PIS/COFINS.
    RealProfit,
    /// Lucro Presumido: cumulative PIS/COFINS.
    PresumedProfit,
    /// Normal regime whose profit method is not known.
    Unspecified,
}

/// Tax regime of a trading party.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    /// Simples Nacional.
    Simplified,
    Normal(NormalRegime),
    #[default]
    Unknown,
}

/// Outcome of [`TaxRegime::normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedRegime {
    pub regime: TaxRegime,
    /// The input was absent or unrecognized and the normal regime was assumed.
    pub defaulted: bool,
}

impl TaxRegime {
    /// Map a free-form regime string to a regime.
    ///
    /// Anything mentioning "simples" or "nacional" is simplified. Absent or
    /// unrecognized input falls back to the normal regime with `defaulted`
    /// set, never to `Unknown`.
    pub fn normalize(raw: Option<&str>) -> NormalizedRegime {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return NormalizedRegime {
                regime: TaxRegime::Normal(NormalRegime::Unspecified),
                defaulted: true,
            };
        };

        let lower = raw.to_lowercase();
        let (regime, defaulted) = if lower.contains("simples") || lower.contains("nacional") {
            (TaxRegime::Simplified, false)
        } else if lower.contains("presumido") || lower.contains("presumed") {
            (TaxRegime::Normal(NormalRegime::PresumedProfit), false)
        } else if lower.contains("real") {
            (TaxRegime::Normal(NormalRegime::RealProfit), false)
        } else if lower.contains("normal") {
            (TaxRegime::Normal(NormalRegime::Unspecified), false)
        } else {
            (TaxRegime::Normal(NormalRegime::Unspecified), true)
        };

        NormalizedRegime { regime, defaulted }
    }

    pub fn is_simplified(&self) -> bool {
        matches!(self, TaxRegime::Simplified)
    }

    /// Normal regime, including `Unknown` which is treated as normal by default.
    pub fn is_normal(&self) -> bool {
        !self.is_simplified()
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TaxRegime::Unknown)
    }

    /// Whether PIS/COFINS are non-cumulative (creditable) for this regime.
    ///
    /// `unspecified_counts` decides the normal regime of unknown profit method.
    pub fn is_non_cumulative(&self, unspecified_counts: bool) -> bool {
        match self {
            TaxRegime::Simplified => false,
            TaxRegime::Normal(NormalRegime::RealProfit) => true,
            TaxRegime::Normal(NormalRegime::PresumedProfit) => false,
            TaxRegime::Normal(NormalRegime::Unspecified) | TaxRegime::Unknown => {
                unspecified_counts
            }
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            TaxRegime::Simplified => "Simples Nacional",
            TaxRegime::Normal(NormalRegime::RealProfit) => "Lucro Real",
            TaxRegime::Normal(NormalRegime::PresumedProfit) => "Lucro Presumido",
            TaxRegime::Normal(NormalRegime::Unspecified) => "Regime Normal",
            TaxRegime::Unknown => "Desconhecido",
        }
    }
}

impl fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TaxRegime {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        if lower == "unknown" || lower == "desconhecido" {
            return Ok(TaxRegime::Unknown);
        }
        Ok(TaxRegime::normalize(Some(s)).regime)
    }
}
