use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::request::DeviceType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    Active,
    Paused,
    Archived,
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityStatus::Active => "ACTIVE",
            EntityStatus::Paused => "PAUSED",
            EntityStatus::Archived => "ARCHIVED",
        };
        f.write_str(s)
    }
}

impl FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(EntityStatus::Active),
            "PAUSED" => Ok(EntityStatus::Paused),
            "ARCHIVED" => Ok(EntityStatus::Archived),
            other => Err(format!("unknown status {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdFormat {
    Banner,
    Video,
    Native,
    Interstitial,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

/// Creative constraints. `None` on either field matches any ad unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CreativeSpec {
    #[serde(default)]
    pub format: Option<AdFormat>,
    #[serde(default)]
    pub size: Option<AdSize>,
}

/// Targeting rules. An empty list means "no constraint on this dimension".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Targeting {
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub device_types: Vec<DeviceType>,
    /// Interest categories the campaign wants to appear next to.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Sites this campaign must never be served on.
    #[serde(default)]
    pub blocked_sites: Vec<String>,
}

/// Running counters; mutated only by the outcome recorder (impressions) and
/// external reporting (clicks, conversions).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
}

impl PerformanceStats {
    pub fn ctr(&self) -> f64 {
        if self.impressions == 0 {
            return 0.0;
        }
        self.clicks as f64 / self.impressions as f64
    }

    pub fn conversion_rate(&self) -> f64 {
        if self.clicks == 0 {
            return 0.0;
        }
        self.conversions as f64 / self.clicks as f64
    }
}

/// Bidding strategy tag. Unrecognised tags deserialize to `Unknown` so that
/// one badly configured campaign never fails a whole snapshot load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StrategyKind {
    Manual,
    AutoCpc,
    AutoCpm,
    TargetCpa,
    Predictive,
    AiOptimized,
    Unknown,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 7] = [
        StrategyKind::Manual,
        StrategyKind::AutoCpc,
        StrategyKind::AutoCpm,
        StrategyKind::TargetCpa,
        StrategyKind::Predictive,
        StrategyKind::AiOptimized,
        StrategyKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Manual => "MANUAL",
            StrategyKind::AutoCpc => "AUTO_CPC",
            StrategyKind::AutoCpm => "AUTO_CPM",
            StrategyKind::TargetCpa => "TARGET_CPA",
            StrategyKind::Predictive => "PREDICTIVE",
            StrategyKind::AiOptimized => "AI_OPTIMIZED",
            StrategyKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for StrategyKind {
    fn from(s: String) -> Self {
        StrategyKind::from(s.as_str())
    }
}

impl From<&str> for StrategyKind {
    fn from(s: &str) -> Self {
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .unwrap_or(StrategyKind::Unknown)
    }
}

impl From<StrategyKind> for String {
    fn from(k: StrategyKind) -> Self {
        k.as_str().to_string()
    }
}

/// Strategy-specific parameters. Which ones are required depends on the tag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    /// Hard ceiling on any bid; also the MANUAL bid.
    #[serde(default)]
    pub max_bid: Option<f64>,
    #[serde(default)]
    pub target_cpc: Option<f64>,
    #[serde(default)]
    pub target_cpm: Option<f64>,
    #[serde(default)]
    pub target_cpa: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BiddingConfig {
    pub strategy: StrategyKind,
    #[serde(default)]
    pub params: StrategyParams,
}

/// An ad competing for impressions.
///
/// The scoring path only ever reads candidates; counters are changed by the
/// outcome recorder through the store, status and caps by campaign management.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: String,
    pub campaign_id: String,
    pub organization_id: String,

    pub status: EntityStatus,
    pub campaign_status: EntityStatus,

    #[serde(default)]
    pub creative: CreativeSpec,
    #[serde(default)]
    pub targeting: Targeting,
    pub bidding: BiddingConfig,
    #[serde(default)]
    pub stats: PerformanceStats,

    /// Advertiser vertical, matched against a request's blocked categories.
    #[serde(default)]
    pub advertiser_category: Option<String>,

    pub created_at_ms: u64,
    /// Last time the campaign was touched; drives the recency bonus.
    pub updated_at_ms: u64,
}
