//! Credit-card origination core.
//!
//! An initial application is gated by the duplicate and active-credit checks, verified against
//! both bureaus, scored by the underwriting engine and decided automatically. Purchases are then
//! drawn against the approved formal application, and a purchase rejection cascades upward to
//! the applications that are still open. Every collaborator is reached through the ports in
//! [`repository`], [`audit`], [`notification`], [`bureau`] and [`contract`].

pub mod audit;
pub(crate) mod blocking;
pub mod bureau;
pub(crate) mod cascade;
pub mod clock;
pub mod contract;
pub(crate) mod credit_check;
pub mod domain;
pub mod error;
pub mod evaluation;
pub mod in_memory;
pub mod notification;
pub mod ports;
pub mod purchases;
pub mod repository;
pub mod service;

#[cfg(test)]
mod tests;

pub use audit::{AuditAction, AuditEntry, AuditError, AuditEvent, AuditSink, EntityRef};
pub use blocking::{BlockingResolution, DuplicateResolver};
pub use bureau::{
    Bureau, BureauError, BureauErrorKind, BureauFailure, BureauOutcomes, BureauReport,
    BureauSituation, BureauTimeouts, Bureaus, CommercialReference, CreditEntityReport,
    EmploymentStatus, PersonalProfile, ProfileBureau, SituationBureau, VerifiedSituation,
};
pub use cascade::{CascadeOutcome, CascadeRejection};
pub use clock::{Clock, FixedClock, IdSource, SequentialIds, SystemClock};
pub use contract::{ContractRenderer, ContractService, JsonContractRenderer, RateProvider};
pub use credit_check::has_active_credit;
pub use domain::{
    Actor, Address, Audience, Client, ClientId, Comment, CommentLog, Contract, ContractData,
    ContractId, ContractState, Employer, EntityKind, FormalApplication, FormalApplicationId,
    FormalApplicationState, InitialApplication, InitialApplicationId, InitialApplicationState,
    InvalidTaxId, MerchantProfile, Purchase, PurchaseAmounts, PurchaseDraft, PurchaseId,
    PurchaseItem, PurchaseState, RateSet, Role, TaxId, UnknownContractState, User, UserId,
    PLACEHOLDER_NAME,
};
pub use error::{ErrorCategory, OriginationError, RenderError, StateConflict, ValidationError};
pub use evaluation::{
    BureauMessages, EvaluationStatus, ReferenceTally, RuleCode, RuleFinding, RuleOutcome,
    UnderwritingConfig, UnderwritingEngine, UnderwritingVerdict,
};
pub use notification::{Notification, NotificationError, NotificationKind, NotificationSink};
pub use ports::OriginationPorts;
pub use purchases::{check_limit, LimitCheck, PaymentInstrument, PurchasePolicy, PurchaseService};
pub use repository::{
    ApplicationStore, ClientStore, ContractStore, FormalApplicationStore, PurchaseStore,
    RepositoryError, Stores, UserDirectory,
};
pub use service::{ApplicationLifecycleService, ApplicationOutcome, ApplicationRequest};
