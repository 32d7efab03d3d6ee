//! Base bid per bidding strategy.
//!
//! One formula per tag, selected through [`base_bid_fn`]. Adding a strategy
//! means adding a tag and a function here; nothing else branches on it.

use crate::error::ScoringError;
use crate::model::{BiddingConfig, StrategyKind, StrategyParams};

/// AUTO_CPC bid when the campaign has no target configured.
pub const DEFAULT_TARGET_CPC: f64 = 0.5;
/// Bid for an unknown or unset strategy. Strictly positive.
pub const MIN_BASE_BID: f64 = 0.01;
/// TARGET_CPA bids this fraction of the acquisition target.
pub const TARGET_CPA_FACTOR: f64 = 0.1;
/// Placeholder uplift until a real predictive provider is plugged in.
pub const PREDICTIVE_MULTIPLIER: f64 = 1.2;
/// Placeholder uplift until a real optimisation provider is plugged in.
pub const AI_OPTIMIZED_MULTIPLIER: f64 = 1.5;

pub type BaseBidFn = fn(&StrategyParams) -> Result<f64, ScoringError>;

pub fn base_bid_fn(kind: StrategyKind) -> BaseBidFn {
    match kind {
        StrategyKind::Manual => manual,
        StrategyKind::AutoCpc => auto_cpc,
        StrategyKind::AutoCpm => auto_cpm,
        StrategyKind::TargetCpa => target_cpa,
        StrategyKind::Predictive => predictive,
        StrategyKind::AiOptimized => ai_optimized,
        StrategyKind::Unknown => unknown,
    }
}

pub fn base_bid(config: &BiddingConfig) -> Result<f64, ScoringError> {
    base_bid_fn(config.strategy)(&config.params)
}

fn manual(p: &StrategyParams) -> Result<f64, ScoringError> {
    require("MANUAL", "max_bid", p.max_bid)
}

fn auto_cpc(p: &StrategyParams) -> Result<f64, ScoringError> {
    match p.target_cpc {
        Some(v) => check("target_cpc", v),
        None => Ok(DEFAULT_TARGET_CPC),
    }
}

fn auto_cpm(p: &StrategyParams) -> Result<f64, ScoringError> {
    cpm_value("AUTO_CPM", p)
}

fn target_cpa(p: &StrategyParams) -> Result<f64, ScoringError> {
    Ok(require("TARGET_CPA", "target_cpa", p.target_cpa)? * TARGET_CPA_FACTOR)
}

fn predictive(p: &StrategyParams) -> Result<f64, ScoringError> {
    Ok(cpm_value("PREDICTIVE", p)? * PREDICTIVE_MULTIPLIER)
}

fn ai_optimized(p: &StrategyParams) -> Result<f64, ScoringError> {
    Ok(cpm_value("AI_OPTIMIZED", p)? * AI_OPTIMIZED_MULTIPLIER)
}

fn unknown(_: &StrategyParams) -> Result<f64, ScoringError> {
    Ok(MIN_BASE_BID)
}

/// Per-impression value of a CPM target.
fn cpm_value(strategy: &'static str, p: &StrategyParams) -> Result<f64, ScoringError> {
    Ok(require(strategy, "target_cpm", p.target_cpm)? / 1000.0)
}

fn require(
    strategy: &'static str,
    param: &'static str,
    value: Option<f64>,
) -> Result<f64, ScoringError> {
    match value {
        Some(v) => check(param, v),
        None => Err(ScoringError::MissingParameter { strategy, param }),
    }
}

fn check(param: &'static str, value: f64) -> Result<f64, ScoringError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ScoringError::InvalidParameter { param, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(strategy: StrategyKind, params: StrategyParams) -> BiddingConfig {
        BiddingConfig { strategy, params }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn manual_uses_max_bid() {
        let p = StrategyParams {
            max_bid: Some(2.5),
            ..Default::default()
        };
        assert_eq!(base_bid(&cfg(StrategyKind::Manual, p)), Ok(2.5));
    }

    #[test]
    fn auto_cpc_falls_back_to_default() {
        let out = base_bid(&cfg(StrategyKind::AutoCpc, StrategyParams::default()));
        assert_eq!(out, Ok(DEFAULT_TARGET_CPC));

        let p = StrategyParams {
            target_cpc: Some(0.8),
            ..Default::default()
        };
        assert_eq!(base_bid(&cfg(StrategyKind::AutoCpc, p)), Ok(0.8));
    }

    #[test]
    fn cpm_derived_strategies() {
        let p = StrategyParams {
            target_cpm: Some(5.0),
            ..Default::default()
        };
        assert!(approx(base_bid(&cfg(StrategyKind::AutoCpm, p)).unwrap(), 0.005));
        assert!(approx(base_bid(&cfg(StrategyKind::Predictive, p)).unwrap(), 0.006));
        assert!(approx(base_bid(&cfg(StrategyKind::AiOptimized, p)).unwrap(), 0.0075));
    }

    #[test]
    fn target_cpa_bids_a_tenth() {
        let p = StrategyParams {
            target_cpa: Some(20.0),
            ..Default::default()
        };
        assert!(approx(base_bid(&cfg(StrategyKind::TargetCpa, p)).unwrap(), 2.0));
    }

    #[test]
    fn unknown_strategy_gets_a_positive_minimum() {
        let out = base_bid(&cfg(StrategyKind::Unknown, StrategyParams::default())).unwrap();
        assert!(out > 0.0);
        assert_eq!(out, MIN_BASE_BID);
    }

    #[test]
    fn missing_or_invalid_parameters_fail() {
        assert_eq!(
            base_bid(&cfg(StrategyKind::Manual, StrategyParams::default())),
            Err(ScoringError::MissingParameter {
                strategy: "MANUAL",
                param: "max_bid"
            })
        );

        let p = StrategyParams {
            target_cpm: Some(-3.0),
            ..Default::default()
        };
        assert!(matches!(
            base_bid(&cfg(StrategyKind::AutoCpm, p)),
            Err(ScoringError::InvalidParameter { param: "target_cpm", .. })
        ));

        let p = StrategyParams {
            target_cpc: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(base_bid(&cfg(StrategyKind::AutoCpc, p)).is_err());
    }
}
