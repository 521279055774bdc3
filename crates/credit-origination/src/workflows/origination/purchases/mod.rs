//! Purchases drawn against an approved formal application: creation, analyst approval and
//! rejection, including the credit-limit increase branch.

mod service;
mod validation;

pub use service::PurchaseService;
pub use validation::{check_limit, LimitCheck, PaymentInstrument, PurchasePolicy};
