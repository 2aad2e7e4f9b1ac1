use super::candidate::{ApiCandidate, Evidence};

/// Candidates at or above this confidence qualify without a passing probe,
/// provided their evidence is credible on its own.
pub const VERIFIED_CONFIDENCE: u8 = 70;

/// Whether `candidate` is trustworthy enough to be reported as the API URL.
pub fn qualifies(candidate: &ApiCandidate) -> bool {
    if !candidate.is_viable() {
        return false;
    }

    let passed = candidate.has_passing_probe();

    let verified = passed || candidate.confidence() >= VERIFIED_CONFIDENCE;

    let credible = match candidate.evidence() {
        Evidence::HtmlLink | Evidence::ApiSubdomainHeuristic => passed,
        evidence => evidence.is_credible(),
    };

    verified && credible
}

/// Picks the most confident qualifying candidate. Returns `None` rather than
/// falling back to an unverified guess.
pub fn select_best(candidates: &[ApiCandidate]) -> Option<&ApiCandidate> {
    let mut ranked: Vec<&ApiCandidate> = candidates.iter().collect();

    // stable, so equal scores keep discovery order
    ranked.sort_by_key(|c| std::cmp::Reverse(c.confidence()));

    ranked.into_iter().find(|c| qualifies(c))
}
