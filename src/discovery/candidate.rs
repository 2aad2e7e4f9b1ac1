//! API base URL candidates and how their confidence evolves.
//!
//! A candidate's confidence is never stored. It is folded from the ordered
//! list of [`ScoreDecision`]s recorded against the candidate as it moves
//! through mining and probing, so every phase only ever appends.

use serde::{Serialize, Serializer};
use url::Url;

use super::probe::ProbeResult;

/// Confidence a successful probe can raise a candidate to.
pub const PROBE_CEILING: u8 = 90;

const SUCCESS_BONUS: u8 = 50;
const AUTH_REQUIRED_BONUS: u8 = 45;

/// Where a candidate came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum_macros::Display, strum_macros::EnumIter,
)]
pub enum Evidence {
    /// A `base url: https://...` style mention in the page text
    #[serde(rename = "base-url-text")]
    #[strum(serialize = "base-url-text")]
    BaseUrlText,
    #[serde(rename = "html-link")]
    #[strum(serialize = "html-link")]
    HtmlLink,
    /// `https://api.{domain}`, added for every site
    #[serde(rename = "api-subdomain-heuristic")]
    #[strum(serialize = "api-subdomain-heuristic")]
    ApiSubdomainHeuristic,
    /// Found by probing subdomains before the page was fetched
    #[serde(rename = "api-probe")]
    #[strum(serialize = "api-probe")]
    ApiProbe,
    #[serde(rename = "Known provider registry")]
    #[strum(serialize = "Known provider registry")]
    Registry,
}

impl Evidence {
    /// Whether this evidence can support a best URL without a passing probe of
    /// its own.
    pub fn is_credible(self) -> bool {
        matches!(
            self,
            Evidence::BaseUrlText | Evidence::Registry | Evidence::ApiProbe
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl From<u8> for ConfidenceLabel {
    fn from(confidence: u8) -> Self {
        match confidence {
            70.. => ConfidenceLabel::High,
            40..=69 => ConfidenceLabel::Medium,
            _ => ConfidenceLabel::Low,
        }
    }
}

/// One step in a candidate's scoring history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreDecision {
    /// The initial score assigned when the candidate was found.
    Mined { confidence: u8 },
    /// A probe path answered 200.
    ProbeSucceeded,
    /// A probe path answered 401 or 403.
    ProbeAuthRequired,
    /// Something answered, but nothing that proves an API.
    ProbeInconclusive,
    /// Every probe request failed at the network level.
    Unreachable,
}

impl ScoreDecision {
    fn apply(self, current: u8) -> u8 {
        let bump = |bonus: u8| current.max(current.saturating_add(bonus).min(PROBE_CEILING));

        match self {
            ScoreDecision::Mined { confidence } => confidence.min(100),
            ScoreDecision::ProbeSucceeded => bump(SUCCESS_BONUS),
            ScoreDecision::ProbeAuthRequired => bump(AUTH_REQUIRED_BONUS),
            ScoreDecision::ProbeInconclusive => current,
            ScoreDecision::Unreachable => 0,
        }
    }
}

/// The probe path that decided a candidate's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub path: String,
    pub status: u16,
}

impl ProbeOutcome {
    /// 200, 401 and 403 all prove that an API answers at the path.
    pub fn passed(&self) -> bool {
        matches!(self.status, 200 | 401 | 403)
    }
}

/// Model identifiers sniffed from a models listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelSample {
    /// The first few identifiers, in response order
    pub ids: Vec<String>,
    /// How many identifiers the response listed in total
    pub count: usize,
}

/// Strips surrounding whitespace and trailing slashes. URLs that parse are
/// also put in canonical form (lowercase scheme and host, default port
/// removed).
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();

    match Url::parse(raw) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim_end_matches('/').to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCandidate {
    url: String,
    evidence: Evidence,
    decisions: Vec<ScoreDecision>,
    probe: Option<ProbeOutcome>,
    models: Option<ModelSample>,
}

impl ApiCandidate {
    pub fn new(url: &str, evidence: Evidence, confidence: u8) -> ApiCandidate {
        ApiCandidate {
            url: normalize_url(url),
            evidence,
            decisions: vec![ScoreDecision::Mined { confidence }],
            probe: None,
            models: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn evidence(&self) -> Evidence {
        self.evidence
    }

    pub fn decisions(&self) -> &[ScoreDecision] {
        &self.decisions
    }

    pub fn probe(&self) -> Option<&ProbeOutcome> {
        self.probe.as_ref()
    }

    pub fn models(&self) -> Option<&ModelSample> {
        self.models.as_ref()
    }

    pub fn confidence(&self) -> u8 {
        self.decisions.iter().fold(0, |score, d| d.apply(score))
    }

    pub fn label(&self) -> ConfidenceLabel {
        ConfidenceLabel::from(self.confidence())
    }

    /// Whether the candidate is still in consideration.
    pub fn is_viable(&self) -> bool {
        self.confidence() > 0
    }

    pub fn was_probed(&self) -> bool {
        self.decisions
            .iter()
            .any(|d| !matches!(d, ScoreDecision::Mined { .. }))
    }

    pub fn is_unreachable(&self) -> bool {
        self.decisions.contains(&ScoreDecision::Unreachable)
    }

    pub fn has_passing_probe(&self) -> bool {
        self.probe.as_ref().is_some_and(ProbeOutcome::passed)
    }

    pub fn record(&mut self, decision: ScoreDecision) {
        self.decisions.push(decision);
    }

    /// Records the outcome of probing this candidate's base URL.
    pub fn apply_probe(&mut self, result: &ProbeResult) {
        match result {
            ProbeResult::Responded { outcome, models } => {
                let decision = if outcome.status == 200 {
                    ScoreDecision::ProbeSucceeded
                } else {
                    ScoreDecision::ProbeAuthRequired
                };

                self.probe = Some(outcome.clone());
                self.models = models.clone();
                self.record(decision);
            }
            ProbeResult::Inconclusive => self.record(ScoreDecision::ProbeInconclusive),
            ProbeResult::Unreachable => self.record(ScoreDecision::Unreachable),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CandidateView<'a> {
    url: &'a str,
    confidence: u8,
    confidence_label: ConfidenceLabel,
    evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<&'a ProbeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    models: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_count: Option<usize>,
}

impl Serialize for ApiCandidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CandidateView {
            url: &self.url,
            confidence: self.confidence(),
            confidence_label: self.label(),
            evidence: self.evidence,
            probe: self.probe.as_ref(),
            models: self.models.as_ref().map(|m| m.ids.as_slice()),
            model_count: self.models.as_ref().map(|m| m.count),
        }
        .serialize(serializer)
    }
}

/// Candidates of one discovery run, unique by normalized URL. The first
/// insertion of a URL wins.
#[derive(Debug, Default, Clone)]
pub struct CandidateSet {
    candidates: Vec<ApiCandidate>,
}

impl CandidateSet {
    pub fn new() -> CandidateSet {
        CandidateSet::default()
    }

    /// Returns false if a candidate with the same URL is already present.
    pub fn insert(&mut self, candidate: ApiCandidate) -> bool {
        if self.contains(candidate.url()) {
            return false;
        }

        self.candidates.push(candidate);

        true
    }

    pub fn contains(&self, url: &str) -> bool {
        let url = normalize_url(url);

        self.candidates.iter().any(|c| c.url == url)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApiCandidate> {
        self.candidates.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ApiCandidate> {
        self.candidates.iter_mut()
    }

    pub fn as_slice(&self) -> &[ApiCandidate] {
        &self.candidates
    }

    pub fn into_vec(self) -> Vec<ApiCandidate> {
        self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responded(status: u16) -> ProbeResult {
        ProbeResult::Responded {
            outcome: ProbeOutcome {
                path: "/v1/models".into(),
                status,
            },
            models: None,
        }
    }

    #[test]
    fn test_probe_bumps_are_capped() {
        let mut direct = ApiCandidate::new("https://api.acme.example", Evidence::ApiProbe, 40);
        direct.apply_probe(&responded(200));
        assert_eq!(direct.confidence(), 90);
        assert_eq!(direct.label(), ConfidenceLabel::High);

        let mut auth = ApiCandidate::new("https://api.acme.example", Evidence::HtmlLink, 40);
        auth.apply_probe(&responded(401));
        assert_eq!(auth.confidence(), 85);

        let mut heuristic =
            ApiCandidate::new("https://api.acme.example", Evidence::ApiSubdomainHeuristic, 20);
        heuristic.apply_probe(&responded(403));
        assert_eq!(heuristic.confidence(), 65);
        assert_eq!(heuristic.label(), ConfidenceLabel::Medium);
    }

    #[test]
    fn test_probing_never_lowers_a_registry_score() {
        let mut known = ApiCandidate::new("https://api.openai.com", Evidence::Registry, 100);
        known.apply_probe(&responded(200));

        assert_eq!(known.confidence(), 100);
    }

    #[test]
    fn test_unreachable_removes_from_consideration() {
        let mut text = ApiCandidate::new("https://api.acme.example/v1", Evidence::BaseUrlText, 50);
        text.apply_probe(&ProbeResult::Inconclusive);
        assert_eq!(text.confidence(), 50);

        text.apply_probe(&ProbeResult::Unreachable);
        assert_eq!(text.confidence(), 0);
        assert!(!text.is_viable());
        assert!(text.is_unreachable());
        assert_eq!(text.decisions().len(), 3);
    }

    #[test]
    fn test_set_deduplicates_by_normalized_url() {
        let mut set = CandidateSet::new();

        assert!(set.insert(ApiCandidate::new("https://API.acme.example/", Evidence::BaseUrlText, 50)));
        assert!(!set.insert(ApiCandidate::new(
            "https://api.acme.example",
            Evidence::ApiSubdomainHeuristic,
            20
        )));
        assert!(set.insert(ApiCandidate::new("https://acme.example/api//", Evidence::HtmlLink, 40)));

        assert_eq!(set.len(), 2);
        assert_eq!(set.as_slice()[0].url(), "https://api.acme.example");
        assert_eq!(set.as_slice()[0].evidence(), Evidence::BaseUrlText);
        assert_eq!(set.as_slice()[1].url(), "https://acme.example/api");
    }

    #[test]
    fn test_serialized_shape() {
        let mut candidate = ApiCandidate::new("https://api.acme.example", Evidence::ApiProbe, 40);
        candidate.apply_probe(&ProbeResult::Responded {
            outcome: ProbeOutcome {
                path: "/v1/models".into(),
                status: 200,
            },
            models: Some(ModelSample {
                ids: vec!["m1".into()],
                count: 1,
            }),
        });

        let json = serde_json::to_value(&candidate).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "url": "https://api.acme.example",
                "confidence": 90,
                "confidenceLabel": "high",
                "evidence": "api-probe",
                "probe": { "path": "/v1/models", "status": 200 },
                "models": ["m1"],
                "modelCount": 1,
            })
        );

        let registry = ApiCandidate::new("https://api.openai.com", Evidence::Registry, 100);
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json["evidence"], "Known provider registry");
        assert!(json.get("probe").is_none());
    }
}
