use rust_decimal::Decimal;
use serde::Serialize;

use super::bureau::BureauFailure;
use super::domain::{EntityKind, InvalidTaxId, UserId};
use super::repository::RepositoryError;

/// Bad input shape. Always reported verbatim to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cantidad de cuotas debe estar entre {min} y {max}")]
    InstallmentsOutOfRange { min: u8, max: u8, found: u8 },
    #[error("el monto de la compra debe ser mayor a cero")]
    NonPositiveAmount,
    #[error("monto fuera de rango")]
    AmountOutOfRange,
    #[error("la compra debe incluir al menos un producto")]
    EmptyItems,
    #[error("el producto '{name}' tiene precio o cantidad inválidos")]
    InvalidItem { name: String },
    #[error("el ponderador debe ser mayor a cero")]
    InvalidWeighting,
    #[error("el motivo de rechazo debe tener al menos {min} caracteres")]
    ReasonTooShort { min: usize },
    #[error("el monto ponderado {weighted} supera el límite de crédito {limit}")]
    LimitExceeded { limit: Decimal, weighted: Decimal },
    #[error("se requieren número de tarjeta y número de cuenta para aprobar la compra")]
    MissingPaymentInstrument,
    #[error(transparent)]
    TaxId(#[from] InvalidTaxId),
}

/// A record is missing, or its state forbids the requested transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateConflict {
    #[error("{entity} {id} no encontrada")]
    NotFound { entity: EntityKind, id: String },
    #[error("{entity} {id} está en estado {state}; se requiere {expected}")]
    InvalidState {
        entity: EntityKind,
        id: String,
        state: String,
        expected: String,
    },
    #[error("el cliente ya tiene una solicitud vigente con este comercio")]
    DuplicateSameMerchant,
    #[error("el cliente tiene una solicitud vigente con el comercio {merchant_name}")]
    DuplicateOtherMerchant {
        merchant_id: UserId,
        merchant_name: String,
    },
    #[error("el cliente ya posee un crédito activo")]
    ActiveCredit,
    #[error("la solicitud formal {id} no tiene compras vigentes")]
    NoActivePurchase { id: String },
    #[error("la solicitud formal {id} pertenece a otro comercio")]
    ForeignMerchant { id: String, merchant_id: UserId },
}

impl StateConflict {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        StateConflict::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: EntityKind,
        id: impl ToString,
        state: &str,
        expected: &str,
    ) -> Self {
        StateConflict::InvalidState {
            entity,
            id: id.to_string(),
            state: state.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Failure while rendering a contract document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no se pudo generar el documento del contrato: {0}")]
pub struct RenderError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    StateConflict,
    Dependency,
}

/// Error raised by the origination services.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OriginationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Conflict(#[from] StateConflict),
    #[error(transparent)]
    Bureau(#[from] BureauFailure),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl OriginationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            OriginationError::Validation(_) => ErrorCategory::Validation,
            OriginationError::Conflict(_)
            | OriginationError::Repository(RepositoryError::StaleVersion { .. }) => {
                ErrorCategory::StateConflict
            }
            OriginationError::Bureau(_)
            | OriginationError::Repository(_)
            | OriginationError::Render(_) => ErrorCategory::Dependency,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            OriginationError::Bureau(failure) => failure.is_retryable(),
            OriginationError::Repository(error) => matches!(
                error,
                RepositoryError::Unavailable(_) | RepositoryError::StaleVersion { .. }
            ),
            _ => false,
        }
    }
}

impl From<InvalidTaxId> for OriginationError {
    fn from(value: InvalidTaxId) -> Self {
        Self::Validation(ValidationError::TaxId(value))
    }
}
