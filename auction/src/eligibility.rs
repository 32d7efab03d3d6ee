//! Decides which candidates may bid on a request.
//!
//! Every dimension is a small pure function; `RULES` chains them with logical
//! AND and stops at the first rejection. No async, no IO, no shared writes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{
    AdUnit, BidRequest, BudgetState, Candidate, CreativeSpec, EntityStatus, GeoContext, Targeting,
};

/// Score given to a region-level geo match (an exact country match scores 1).
pub const REGION_MATCH_SCORE: f64 = 0.6;

/// Result of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    CandidateInactive,
    CampaignInactive,
    NoBudgetState,
    BudgetExhausted,
    FormatMismatch,
    SizeMismatch,
    GeoMismatch,
    DeviceMismatch,
    CategoryMismatch,
    BlockedCategory,
    BlockedSite,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// How well one targeting dimension matches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DimensionMatch {
    /// One side declares nothing; always a pass, contributes no score.
    Unconstrained,
    Exact,
    /// Match weaker than exact, scored in (0, 1).
    Partial(f64),
    Mismatch,
}

impl DimensionMatch {
    /// Per-dimension match score, `None` when the dimension is absent.
    pub fn score(&self) -> Option<f64> {
        match self {
            DimensionMatch::Unconstrained => None,
            DimensionMatch::Exact => Some(1.0),
            DimensionMatch::Partial(s) => Some(s.clamp(0.0, 1.0)),
            DimensionMatch::Mismatch => Some(0.0),
        }
    }

    pub fn passes(&self) -> bool {
        !matches!(self, DimensionMatch::Mismatch)
    }
}

/// Everything a rule may look at for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityContext<'a> {
    pub candidate: &'a Candidate,
    pub request: &'a BidRequest,
    pub ad_unit: &'a AdUnit,
    pub budget: Option<&'a BudgetState>,
}

type Rule = fn(&EligibilityContext<'_>) -> Result<(), Eligibility>;

const RULES: &[Rule] = &[
    status_rule,
    budget_rule,
    format_rule,
    geo_rule,
    device_rule,
    category_rule,
    blocklist_rule,
];

/// Check whether one candidate may bid on this request.
pub fn check_candidate_eligibility(ctx: &EligibilityContext<'_>) -> Eligibility {
    match RULES.iter().try_for_each(|rule| rule(ctx)) {
        Ok(()) => Eligibility::Eligible,
        Err(reason) => reason,
    }
}

/// Output of [`filter_eligible`].
#[derive(Debug, Default)]
pub struct FilterOutcome<'a> {
    pub eligible: Vec<&'a Candidate>,
    pub rejected: Vec<(String, Eligibility)>,
}

/// Narrows a candidate snapshot to the candidates allowed to bid.
///
/// `budgets` is keyed by campaign id; a candidate whose campaign has no
/// budget state is excluded.
pub fn filter_eligible<'a>(
    candidates: &'a [Candidate],
    request: &BidRequest,
    ad_unit: &AdUnit,
    budgets: &HashMap<String, BudgetState>,
) -> FilterOutcome<'a> {
    let mut out = FilterOutcome::default();

    for c in candidates {
        let ctx = EligibilityContext {
            candidate: c,
            request,
            ad_unit,
            budget: budgets.get(&c.campaign_id),
        };

        match check_candidate_eligibility(&ctx) {
            Eligibility::Eligible => out.eligible.push(c),
            reason => out.rejected.push((c.candidate_id.clone(), reason)),
        }
    }

    out
}

/* =========================
Rules
========================= */

fn status_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    if ctx.candidate.status != EntityStatus::Active {
        return Err(Eligibility::CandidateInactive);
    }
    if ctx.candidate.campaign_status != EntityStatus::Active {
        return Err(Eligibility::CampaignInactive);
    }
    Ok(())
}

fn budget_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    match ctx.budget {
        None => Err(Eligibility::NoBudgetState),
        Some(b) if !b.has_headroom() => Err(Eligibility::BudgetExhausted),
        Some(_) => Ok(()),
    }
}

fn format_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    format_compatible(&ctx.candidate.creative, ctx.ad_unit)
}

fn geo_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    if geo_match(&ctx.candidate.targeting, &ctx.request.geo).passes() {
        Ok(())
    } else {
        Err(Eligibility::GeoMismatch)
    }
}

fn device_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    if device_match(&ctx.candidate.targeting, ctx.request).passes() {
        Ok(())
    } else {
        Err(Eligibility::DeviceMismatch)
    }
}

fn category_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    if category_match(&ctx.candidate.targeting, ctx.request).passes() {
        Ok(())
    } else {
        Err(Eligibility::CategoryMismatch)
    }
}

fn blocklist_rule(ctx: &EligibilityContext<'_>) -> Result<(), Eligibility> {
    let c = ctx.candidate;
    let r = ctx.request;

    if let Some(cat) = &c.advertiser_category {
        if r.blocked_categories.iter().any(|b| b.eq_ignore_ascii_case(cat)) {
            return Err(Eligibility::BlockedCategory);
        }
    }

    if c.targeting.blocked_sites.iter().any(|s| s == &r.site_id) {
        return Err(Eligibility::BlockedSite);
    }

    Ok(())
}

/* =========================
Dimension matchers
========================= */

/// Creative vs ad unit. A missing constraint on either side is a wildcard.
pub fn format_compatible(creative: &CreativeSpec, ad_unit: &AdUnit) -> Result<(), Eligibility> {
    if let (Some(want), Some(have)) = (creative.format, ad_unit.format) {
        if want != have {
            return Err(Eligibility::FormatMismatch);
        }
    }
    if let (Some(want), Some(have)) = (creative.size, ad_unit.size) {
        if want != have {
            return Err(Eligibility::SizeMismatch);
        }
    }
    Ok(())
}

/// Geo targeting. A level (country, region) is compared only when both sides
/// specify it; an exact country match takes precedence over a region match.
pub fn geo_match(t: &Targeting, geo: &GeoContext) -> DimensionMatch {
    let country = geo.country.as_deref().filter(|_| !t.countries.is_empty());
    let region = geo.region.as_deref().filter(|_| !t.regions.is_empty());

    if country.is_none() && region.is_none() {
        return DimensionMatch::Unconstrained;
    }

    if country.is_some_and(|c| contains_ci(&t.countries, c)) {
        return DimensionMatch::Exact;
    }
    if region.is_some_and(|r| contains_ci(&t.regions, r)) {
        return DimensionMatch::Partial(REGION_MATCH_SCORE);
    }

    DimensionMatch::Mismatch
}

pub fn device_match(t: &Targeting, request: &BidRequest) -> DimensionMatch {
    match request.device_type {
        _ if t.device_types.is_empty() => DimensionMatch::Unconstrained,
        None => DimensionMatch::Unconstrained,
        Some(d) if t.device_types.contains(&d) => DimensionMatch::Exact,
        Some(_) => DimensionMatch::Mismatch,
    }
}

/// Interest targeting. Exact when every targeted category is on the page,
/// partial (scored by overlap) when only some are.
pub fn category_match(t: &Targeting, request: &BidRequest) -> DimensionMatch {
    if t.categories.is_empty() || request.categories.is_empty() {
        return DimensionMatch::Unconstrained;
    }

    let overlap = t
        .categories
        .iter()
        .filter(|c| contains_ci(&request.categories, c))
        .count();

    if overlap == 0 {
        DimensionMatch::Mismatch
    } else if overlap == t.categories.len() {
        DimensionMatch::Exact
    } else {
        DimensionMatch::Partial(0.5 + 0.5 * overlap as f64 / t.categories.len() as f64)
    }
}

fn contains_ci(list: &[String], needle: &str) -> bool {
    list.iter().any(|x| x.eq_ignore_ascii_case(needle))
}
