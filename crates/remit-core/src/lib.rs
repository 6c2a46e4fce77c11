pub mod error;
pub mod events;
pub mod models;
pub mod snapshot;
pub mod storage;

pub use error::{ClearanceError, EvidenceField};
pub use events::StatusEvent;
pub use models::{
    ChequeInstrument, ChequeStatus, EvidenceDocument, InstallmentObligation, ObligationKind,
    PaymentStatus, TransitionEvidence,
};
pub use snapshot::{
    ChequeDetails, PaymentDetails, PaymentSnapshot, SNAPSHOT_SCHEMA_VERSION, SnapshotError,
};
pub use storage::{
    AuditTrail, CommitOutcome, InstrumentStore, ObligationDirectory, Registration, StatusPublisher,
};
