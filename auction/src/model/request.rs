use serde::{Deserialize, Serialize};

use crate::error::AuctionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Ctv,
}

/// Where the impression is served. Either level may be missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoContext {
    /// ISO country code, e.g. `US`.
    #[serde(default)]
    pub country: Option<String>,
    /// Region code, e.g. `US-CA`.
    #[serde(default)]
    pub region: Option<String>,
}

/// One incoming impression opportunity. Read-only for the whole auction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BidRequest {
    pub request_id: String,
    pub site_id: String,
    pub ad_unit_id: String,

    /// Minimum acceptable price; bids below it are excluded.
    pub floor_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub geo: GeoContext,
    #[serde(default)]
    pub user_id: Option<String>,

    /// Page/site categories, used for interest targeting.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Advertiser categories the publisher refuses on this placement.
    #[serde(default)]
    pub blocked_categories: Vec<String>,

    /// Request time; all time-dependent scoring is relative to this.
    pub timestamp_ms: u64,
    /// Time budget. `None` falls back to the configured default.
    #[serde(default)]
    pub tmax_ms: Option<u64>,

    /// Protocol passthrough, copied to the result untouched.
    #[serde(default)]
    pub impression_id: Option<String>,
    #[serde(default)]
    pub deal_id: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl BidRequest {
    /// Rejects requests that must never reach persistence.
    pub fn validate(&self) -> Result<(), AuctionError> {
        for (name, value) in [
            ("request_id", &self.request_id),
            ("ad_unit_id", &self.ad_unit_id),
            ("site_id", &self.site_id),
        ] {
            if value.trim().is_empty() {
                return Err(AuctionError::Validation(format!("missing {name}")));
            }
        }

        if !self.floor_price.is_finite() || self.floor_price < 0.0 {
            return Err(AuctionError::Validation(format!(
                "floor_price must be finite and non-negative, got {}",
                self.floor_price
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn mk_request(request_id: &str) -> BidRequest {
        BidRequest {
            request_id: request_id.to_string(),
            site_id: "site-1".into(),
            ad_unit_id: "unit-1".into(),
            floor_price: 0.001,
            currency: "USD".into(),
            device_type: Some(DeviceType::Mobile),
            geo: GeoContext {
                country: Some("US".into()),
                region: Some("US-CA".into()),
            },
            user_id: None,
            categories: vec!["sports".into()],
            blocked_categories: vec![],
            timestamp_ms: 1_700_000_000_000,
            tmax_ms: Some(100),
            impression_id: Some("imp-1".into()),
            deal_id: None,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(mk_request("r1").validate().is_ok());
    }

    #[test]
    fn missing_ids_are_rejected() {
        let mut r = mk_request("r1");
        r.request_id = "  ".into();
        assert!(matches!(r.validate(), Err(AuctionError::Validation(m)) if m.contains("request_id")));

        let mut r = mk_request("r1");
        r.ad_unit_id.clear();
        assert!(matches!(r.validate(), Err(AuctionError::Validation(m)) if m.contains("ad_unit_id")));

        let mut r = mk_request("r1");
        r.site_id.clear();
        assert!(matches!(r.validate(), Err(AuctionError::Validation(m)) if m.contains("site_id")));
    }

    #[test]
    fn bad_floor_is_rejected() {
        let mut r = mk_request("r1");
        r.floor_price = f64::NAN;
        assert!(r.validate().is_err());

        r.floor_price = -1.0;
        assert!(r.validate().is_err());
    }

    #[test]
    fn optional_fields_default_when_absent() {
        let json = r#"{
            "request_id": "r9", "site_id": "s", "ad_unit_id": "u",
            "floor_price": 0.5, "timestamp_ms": 1
        }"#;
        let r: BidRequest = serde_json::from_str(json).unwrap();
        assert_eq!(r.currency, "USD");
        assert!(r.device_type.is_none());
        assert!(r.categories.is_empty());
        assert!(r.tmax_ms.is_none());
    }
}
