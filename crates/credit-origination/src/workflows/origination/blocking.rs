use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::domain::{InitialApplication, InitialApplicationState, PurchaseState, TaxId, UserId};
use super::error::StateConflict;
use super::repository::{RepositoryError, Stores, UserDirectory};

/// Whether a new inquiry for a tax id must be refused, and because of whom.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockingResolution {
    pub blocked_by_same_merchant: bool,
    pub blocked_by_other_merchant: bool,
    pub origin_merchant_id: Option<UserId>,
    pub origin_merchant_name: Option<String>,
}

impl BlockingResolution {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by_same_merchant || self.blocked_by_other_merchant
    }

    /// Another merchant's claim wins over the requester's own history.
    pub fn into_result(self) -> Result<(), StateConflict> {
        if self.blocked_by_other_merchant {
            let merchant_id = self.origin_merchant_id.unwrap_or_else(|| UserId::from(""));
            let merchant_name = self
                .origin_merchant_name
                .unwrap_or_else(|| merchant_id.to_string());
            return Err(StateConflict::DuplicateOtherMerchant {
                merchant_id,
                merchant_name,
            });
        }
        if self.blocked_by_same_merchant {
            return Err(StateConflict::DuplicateSameMerchant);
        }
        Ok(())
    }
}

/// Decides whether existing initial applications for a person lock out a new one.
#[derive(Clone)]
pub struct DuplicateResolver {
    stores: Stores,
    users: Arc<dyn UserDirectory>,
}

impl DuplicateResolver {
    pub fn new(stores: Stores, users: Arc<dyn UserDirectory>) -> Self {
        Self { stores, users }
    }

    pub async fn resolve(
        &self,
        tax_id: &TaxId,
        requesting_merchant: &UserId,
    ) -> Result<BlockingResolution, RepositoryError> {
        let existing = self.stores.applications.by_tax_id(tax_id).await?;
        let mut resolution = BlockingResolution::default();

        for application in &existing {
            let same_merchant = &application.merchant_id == requesting_merchant;
            if !self.is_blocking(application, same_merchant).await? {
                continue;
            }

            if same_merchant {
                resolution.blocked_by_same_merchant = true;
            } else if !resolution.blocked_by_other_merchant {
                resolution.blocked_by_other_merchant = true;
                resolution.origin_merchant_id = Some(application.merchant_id.clone());
            }
        }

        if let Some(origin) = resolution.origin_merchant_id.clone() {
            resolution.origin_merchant_name = Some(self.merchant_name(&origin).await);
        }

        debug!(
            %tax_id,
            checked = existing.len(),
            same_merchant = resolution.blocked_by_same_merchant,
            other_merchant = resolution.blocked_by_other_merchant,
            "duplicate check finished"
        );

        Ok(resolution)
    }

    async fn is_blocking(
        &self,
        application: &InitialApplication,
        same_merchant: bool,
    ) -> Result<bool, RepositoryError> {
        match (application.state, same_merchant) {
            (InitialApplicationState::Expired, _) => Ok(false),
            (InitialApplicationState::Pending | InitialApplicationState::Rejected, _) => Ok(true),
            (InitialApplicationState::Approved, true) => Ok(true),
            (InitialApplicationState::Approved, false) => self.has_active_draw(application).await,
        }
    }

    /// An approved inquiry only locks other merchants out while a purchase is drawn against it.
    async fn has_active_draw(
        &self,
        application: &InitialApplication,
    ) -> Result<bool, RepositoryError> {
        let Some(formal) = self
            .stores
            .formal_applications
            .by_initial_application(&application.id)
            .await?
        else {
            return Ok(false);
        };

        let purchases = self
            .stores
            .purchases
            .by_formal_application(&formal.id)
            .await?;
        Ok(purchases
            .iter()
            .any(|purchase| purchase.state != PurchaseState::Rejected))
    }

    async fn merchant_name(&self, merchant: &UserId) -> String {
        match self.users.get(merchant).await {
            Ok(Some(user)) => user.display_name().to_string(),
            _ => merchant.to_string(),
        }
    }
}
