use serde::{Deserialize, Serialize};

use super::candidate::{AdFormat, AdSize};

/// A placement on a publisher site.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdUnit {
    pub ad_unit_id: String,
    pub site_id: String,
    pub organization_id: String,
    #[serde(default)]
    pub format: Option<AdFormat>,
    #[serde(default)]
    pub size: Option<AdSize>,
}
