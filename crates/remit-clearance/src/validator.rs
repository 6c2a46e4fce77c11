use remit_core::{ChequeStatus, ClearanceError, EvidenceField, TransitionEvidence};

/// Legal targets from `from`. Terminal states return an empty slice.
pub fn allowed_targets(from: ChequeStatus) -> &'static [ChequeStatus] {
    use ChequeStatus::*;

    match from {
        Received => &[Presented, Returned],
        Presented => &[Cleared, Rejected, Bounced, Returned],
        Returned => &[Presented],
        Cleared | Rejected | Bounced => &[],
    }
}

pub fn is_legal(from: ChequeStatus, to: ChequeStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// The single piece of evidence an edge into `target` cannot go without.
pub fn required_evidence(target: ChequeStatus) -> Option<EvidenceField> {
    match target {
        ChequeStatus::Presented => Some(EvidenceField::PresentationDate),
        ChequeStatus::Cleared => Some(EvidenceField::ClearanceDate),
        ChequeStatus::Rejected | ChequeStatus::Bounced | ChequeStatus::Returned => {
            Some(EvidenceField::Reason)
        }
        ChequeStatus::Received => None,
    }
}

/// Checks the edge first, then its evidence. Nothing is written either way.
pub fn validate(
    from: ChequeStatus,
    to: ChequeStatus,
    evidence: &TransitionEvidence,
) -> Result<(), ClearanceError> {
    if !is_legal(from, to) {
        return Err(ClearanceError::InvalidTransition { from, to });
    }

    let Some(field) = required_evidence(to) else {
        return Ok(());
    };

    let satisfied = match field {
        EvidenceField::PresentationDate => evidence.presentation_date.is_some(),
        EvidenceField::ClearanceDate => evidence.clearance_date.is_some(),
        EvidenceField::Reason => evidence.trimmed_reason().is_some(),
    };

    if satisfied {
        Ok(())
    } else {
        Err(ClearanceError::MissingEvidence { target: to, field })
    }
}
