use chrono::NaiveDate;

/// Effective due date after a cheque dated `cheque_date` is accepted.
///
/// A post-dated cheque pushes the due date out to its own date; an earlier
/// one leaves it alone. The result is never earlier than the input.
pub fn reconcile(cheque_date: NaiveDate, current_effective_due_date: NaiveDate) -> NaiveDate {
    if cheque_date > current_effective_due_date {
        cheque_date
    } else {
        current_effective_due_date
    }
}
