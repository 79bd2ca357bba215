use serde::Serialize;

use crate::config::CERTIFICATION_THRESHOLD;
use crate::ledger::Aggregate;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    NotEligible,
    Eligible,
    /// All content covered but the quiz average is too low; the learner is
    /// routed back into the course instead of being blocked.
    MustRetake,
}

/// What the certificate panel shows. An issued certificate takes
/// precedence for display only.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "status", content = "verdict", rename_all = "snake_case")]
pub enum CertificationView {
    AlreadyCertified,
    Pending(Verdict),
}

pub fn evaluate(progress_percentage: u8, average_score: Option<f64>) -> Verdict {
    if progress_percentage < 100 {
        return Verdict::NotEligible;
    }
    match average_score {
        None => Verdict::Eligible,
        Some(avg) if avg >= f64::from(CERTIFICATION_THRESHOLD) => Verdict::Eligible,
        Some(_) => Verdict::MustRetake,
    }
}

pub fn evaluate_aggregate(aggregate: &Aggregate) -> Verdict {
    evaluate(aggregate.progress_percentage(), aggregate.average_score)
}

pub fn view(aggregate: &Aggregate, already_certified: bool) -> CertificationView {
    if already_certified {
        CertificationView::AlreadyCertified
    } else {
        CertificationView::Pending(evaluate_aggregate(aggregate))
    }
}
