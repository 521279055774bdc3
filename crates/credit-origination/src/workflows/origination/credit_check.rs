use super::domain::{ContractState, TaxId};
use super::repository::{RepositoryError, Stores};

/// True when any formal application for the tax id already has a generated contract. Voided or
/// draft contracts do not count.
pub async fn has_active_credit(stores: &Stores, tax_id: &TaxId) -> Result<bool, RepositoryError> {
    let formal_applications = stores.formal_applications.by_tax_id(tax_id).await?;

    for formal in formal_applications {
        let contracts = stores.contracts.by_formal_application(&formal.id).await?;
        if contracts
            .iter()
            .any(|contract| contract.state == ContractState::Generated)
        {
            return Ok(true);
        }
    }

    Ok(false)
}
