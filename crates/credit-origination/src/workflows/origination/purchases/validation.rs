use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::super::domain::{FormalApplication, PurchaseAmounts, PurchaseDraft, PurchaseItem};
use super::super::error::ValidationError;

/// Bounds applied to purchases before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasePolicy {
    pub min_installments: u8,
    pub max_installments: u8,
    /// Minimum length of a trimmed rejection reason, in characters.
    pub min_reason_len: usize,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self {
            min_installments: 3,
            max_installments: 14,
            min_reason_len: 10,
        }
    }
}

impl PurchasePolicy {
    pub fn check_installments(&self, installments: u8) -> Result<(), ValidationError> {
        if (self.min_installments..=self.max_installments).contains(&installments) {
            Ok(())
        } else {
            Err(ValidationError::InstallmentsOutOfRange {
                min: self.min_installments,
                max: self.max_installments,
                found: installments,
            })
        }
    }

    pub fn check_items(&self, items: &[PurchaseItem]) -> Result<(), ValidationError> {
        if items.is_empty() {
            return Err(ValidationError::EmptyItems);
        }
        if let Some(item) = items
            .iter()
            .find(|item| item.quantity == 0 || item.unit_price <= Decimal::ZERO)
        {
            return Err(ValidationError::InvalidItem {
                name: item.name.clone(),
            });
        }
        Ok(())
    }

    pub fn check_draft(&self, draft: &PurchaseDraft) -> Result<(), ValidationError> {
        self.check_installments(draft.installments)?;
        self.check_items(&draft.items)?;

        if draft.weighting <= Decimal::ZERO {
            return Err(ValidationError::InvalidWeighting);
        }

        let amounts = PurchaseAmounts::derive(&draft.items, draft.weighting, draft.installments)?;
        if amounts.total <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount);
        }

        Ok(())
    }

    /// Returns the trimmed reason when it is long enough.
    pub fn check_reason(&self, reason: &str) -> Result<String, ValidationError> {
        let trimmed = reason.trim();
        if trimmed.chars().count() < self.min_reason_len {
            return Err(ValidationError::ReasonTooShort {
                min: self.min_reason_len,
            });
        }
        Ok(trimmed.to_string())
    }
}

/// Result of comparing a weighted amount against a formal application's limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitCheck {
    WithinLimit,
    /// Over the limit, tolerated because the application asked for an increase.
    IncreaseRequested { requested: Decimal },
}

pub fn check_limit(
    formal: &FormalApplication,
    weighted: Decimal,
) -> Result<LimitCheck, ValidationError> {
    if weighted <= formal.credit_limit {
        return Ok(LimitCheck::WithinLimit);
    }
    if formal.requests_limit_increase {
        return Ok(LimitCheck::IncreaseRequested { requested: weighted });
    }
    Err(ValidationError::LimitExceeded {
        limit: formal.credit_limit,
        weighted,
    })
}

/// Card and account numbers recorded when a purchase is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub card_number: String,
    pub account_number: String,
}

impl PaymentInstrument {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.card_number.trim().is_empty() || self.account_number.trim().is_empty() {
            return Err(ValidationError::MissingPaymentInstrument);
        }
        Ok(())
    }
}
