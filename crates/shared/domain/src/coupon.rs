//! Coupon entity: a discount code redeemable against carts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_DISCOUNT_PERCENT;
use crate::entity::{Entity, Metadata};
use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    #[serde(flatten)]
    pub meta: Metadata,
    /// Redemption code, stored upper-cased
    pub code: String,
    pub discount_percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_id: Option<String>,
}

impl Coupon {
    pub fn new(code: &str, discount_percent: u8) -> DomainResult<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("coupon code must not be empty"));
        }
        if discount_percent == 0 || discount_percent > MAX_DISCOUNT_PERCENT {
            return Err(DomainError::validation(format!(
                "discount must be between 1 and {}",
                MAX_DISCOUNT_PERCENT
            )));
        }

        Ok(Self {
            meta: Metadata::pending(),
            code: code.to_uppercase(),
            discount_percent,
            expires_at: None,
            merchant_id: None,
        })
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Entity for Coupon {
    const COLLECTION: &'static str = "coupons";
    const ENTITY_NAME: &'static str = "coupon";

    fn metadata(&self) -> &Metadata {
        &self.meta
    }

    fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.meta
    }
}
