//! Price calculator: "price = score".
//!
//! Pure functions of score and tier. Nothing here is cached; every quote is
//! recomputed from the score it is given.

use arena_state::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Per-tier price multipliers. All must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierMultipliers {
    pub alpha: f64,
    pub beta: f64,
    pub omega: f64,
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            omega: 1.0,
        }
    }
}

impl TierMultipliers {
    pub fn get(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Alpha => self.alpha,
            Tier::Beta => self.beta,
            Tier::Omega => self.omega,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingPolicy {
    /// Display price per score point
    pub price_per_point: f64,
    /// On-chain price per score point
    pub lamports_per_point: u64,
    pub total_supply: u64,
    pub tier_multipliers: TierMultipliers,
    /// Fraction of each trade taken as fee
    pub trade_fee: f64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            price_per_point: 0.01,
            lamports_per_point: 67,
            total_supply: 100_000_000,
            tier_multipliers: TierMultipliers::default(),
            trade_fee: 0.01,
        }
    }
}

impl PricingPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.price_per_point > 0.0) {
            return Err("price_per_point must be positive".into());
        }
        for tier in Tier::ALL {
            if !(self.tier_multipliers.get(tier) > 0.0) {
                return Err(format!("{tier} price multiplier must be positive"));
            }
        }
        if self.lamports_per_point == 0 || self.total_supply == 0 {
            return Err("lamports_per_point and total_supply must be positive".into());
        }
        if !(0.0..1.0).contains(&self.trade_fee) {
            return Err("trade_fee must lie in [0, 1)".into());
        }
        Ok(())
    }
}

/// Price snapshot for one score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub score: f64,
    pub tier: Tier,
    pub price: f64,
    pub price_lamports: u64,
    pub price_sol: f64,
    /// `price_sol * total_supply`
    pub market_cap_sol: f64,
    pub quoted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// `amount` is SOL spent
    Buy,
    /// `amount` is tokens sold
    Sell,
}

impl std::str::FromStr for TradeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeSide::Buy),
            "sell" => Ok(TradeSide::Sell),
            other => Err(format!("unknown trade side: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeQuote {
    pub side: TradeSide,
    pub amount_in: f64,
    pub fee_sol: f64,
    /// Tokens received for a buy, SOL received for a sell
    pub amount_out: f64,
    pub price_sol: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PriceCalculator {
    policy: PricingPolicy,
}

impl PriceCalculator {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Score points after the tier multiplier. Both the display and the
    /// on-chain price are derived from this.
    fn priced_points(&self, score: f64, tier: Tier) -> f64 {
        score.max(0.0) * self.policy.tier_multipliers.get(tier)
    }

    /// Monotonically non-decreasing in `score` for a fixed tier.
    pub fn price(&self, score: f64, tier: Tier) -> f64 {
        self.priced_points(score, tier) * self.policy.price_per_point
    }

    pub fn quote(&self, score: f64, tier: Tier, at: DateTime<Utc>) -> PriceQuote {
        let price_lamports = (self.priced_points(score, tier)
            * self.policy.lamports_per_point as f64)
            .floor() as u64;
        let price_sol = price_lamports as f64 / LAMPORTS_PER_SOL;
        PriceQuote {
            score,
            tier,
            price: self.price(score, tier),
            price_lamports,
            price_sol,
            market_cap_sol: price_sol * self.policy.total_supply as f64,
            quoted_at: at,
        }
    }

    /// Buy or sell against a quote. Negative amounts are treated as zero.
    pub fn trade_quote(&self, quote: &PriceQuote, side: TradeSide, amount: f64) -> TradeQuote {
        let amount = amount.max(0.0);
        let fee = self.policy.trade_fee;
        let (fee_sol, amount_out) = match side {
            TradeSide::Buy => {
                let tokens = if quote.price_sol > 0.0 {
                    (amount * (1.0 - fee) / quote.price_sol).floor()
                } else {
                    0.0
                };
                (amount * fee, tokens)
            }
            TradeSide::Sell => {
                let gross = amount * quote.price_sol;
                (gross * fee, gross * (1.0 - fee))
            }
        };
        TradeQuote {
            side,
            amount_in: amount,
            fee_sol,
            amount_out,
            price_sol: quote.price_sol,
        }
    }
}
