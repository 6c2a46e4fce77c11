//! Pure clearance rules: which status edges are legal, how a cheque date
//! moves an installment's due date, and what payment status a reader sees.

pub mod projection;
pub mod reconcile;
pub mod validator;

pub use projection::project;
pub use reconcile::reconcile;
pub use validator::{allowed_targets, is_legal, required_evidence, validate};
