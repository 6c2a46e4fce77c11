use chrono::{DateTime, NaiveDate, Utc};
use remit_core::{ChequeStatus, PaymentStatus};

/// Payment status as a reader sees it at `now`.
///
/// Evaluated on every read and never stored: a rejected, bounced or returned
/// cheque reads `Pending` until the effective due date has passed and
/// `Overdue` after it. The due date itself still counts as on time.
pub fn project(
    status: ChequeStatus,
    effective_due_date: NaiveDate,
    now: DateTime<Utc>,
) -> PaymentStatus {
    match status {
        ChequeStatus::Cleared => PaymentStatus::Paid,
        ChequeStatus::Received => PaymentStatus::UnclearReceived,
        ChequeStatus::Presented => PaymentStatus::UnclearPresented,
        ChequeStatus::Rejected | ChequeStatus::Bounced | ChequeStatus::Returned => {
            if now.date_naive() > effective_due_date {
                PaymentStatus::Overdue
            } else {
                PaymentStatus::Pending
            }
        }
    }
}
