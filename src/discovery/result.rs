//! The result of a discovery run and the classification of its failures.

use std::net::IpAddr;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use super::candidate::ApiCandidate;
use super::extract::ParseError;
use crate::net::{FetchError, FetchErrorKind, SafetyError};
use crate::registry::{AuthType, Compatibility, KnownProvider};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Status {
    Ok,
    /// Something useful was found, but not everything.
    Partial,
    Failed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Source {
    Registry,
    Website,
}

/// Why a run did not end with a verified answer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    InvalidUrl,
    SsrfBlocked,
    DnsFailed,
    FetchTimeout,
    FetchTooLarge,
    FetchHttpError,
    ParseFailed,
    NoMetadataFound,
    NoCandidates,
    ProbeAllFailed,
}

impl FailureReason {
    pub fn description(self) -> &'static str {
        match self {
            FailureReason::InvalidUrl => "the URL could not be parsed or uses an unsupported scheme",
            FailureReason::SsrfBlocked => "the URL points at a private network or is otherwise unsafe to fetch",
            FailureReason::DnsFailed => "the hostname has no DNS records",
            FailureReason::FetchTimeout => "the website did not answer in time",
            FailureReason::FetchTooLarge => "the website's page exceeded the size limit",
            FailureReason::FetchHttpError => "the website answered with an error or could not be reached",
            FailureReason::ParseFailed => "the website did not return an HTML page",
            FailureReason::NoMetadataFound => "neither metadata nor API candidates were found",
            FailureReason::NoCandidates => "no API candidates were found",
            FailureReason::ProbeAllFailed => "every API candidate was unreachable",
        }
    }
}

/// A failure reason together with the status it implies and a warning for the
/// user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub reason: FailureReason,
    pub status: Status,
    pub warning: String,
}

impl Classification {
    pub fn new(reason: FailureReason, status: Status, warning: String) -> Classification {
        Classification {
            reason,
            status,
            warning,
        }
    }
}

pub fn classify_safety_error(err: &SafetyError) -> Classification {
    let reason = match err {
        SafetyError::Malformed(_) | SafetyError::MissingHost | SafetyError::UnsupportedScheme(_) => {
            FailureReason::InvalidUrl
        }
        SafetyError::NoDnsRecords(_) => FailureReason::DnsFailed,
        SafetyError::InsecureScheme
        | SafetyError::EmbeddedCredentials
        | SafetyError::ControlCharacters
        | SafetyError::Blocked { .. } => FailureReason::SsrfBlocked,
    };

    Classification::new(reason, Status::Failed, err.to_string())
}

pub fn classify_fetch_error(err: &FetchError) -> Classification {
    let (reason, status) = match err.kind() {
        FetchErrorKind::InvalidUrl => (FailureReason::InvalidUrl, Status::Failed),
        FetchErrorKind::Blocked => (FailureReason::SsrfBlocked, Status::Failed),
        FetchErrorKind::DnsFailed => (FailureReason::DnsFailed, Status::Failed),
        FetchErrorKind::TimedOut => (FailureReason::FetchTimeout, Status::Failed),
        FetchErrorKind::TooLarge => (FailureReason::FetchTooLarge, Status::Partial),
        FetchErrorKind::TooManyRedirects => (FailureReason::FetchHttpError, Status::Partial),
        FetchErrorKind::ConnectFailed
        | FetchErrorKind::DecodingFailed
        | FetchErrorKind::UnknownReqwestError => (FailureReason::FetchHttpError, Status::Failed),
    };

    Classification::new(reason, status, format!("fetching the website failed: {}", err))
}

pub fn classify_parse_error(err: &ParseError) -> Classification {
    Classification::new(
        FailureReason::ParseFailed,
        Status::Partial,
        format!("the website could not be parsed: {}", err),
    )
}

pub fn classify_http_status(status: u16) -> Classification {
    Classification::new(
        FailureReason::FetchHttpError,
        Status::Partial,
        format!("the website answered with HTTP {}", status),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSection {
    pub best_url: Option<String>,
    pub candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    pub slug: String,
    pub auth_type: AuthType,
    pub compatibility: Compatibility,
    pub is_local: bool,
}

impl From<&KnownProvider> for RegistryInfo {
    fn from(provider: &KnownProvider) -> Self {
        RegistryInfo {
            slug: provider.slug.to_string(),
            auth_type: provider.auth_type,
            compatibility: provider.compatibility,
            is_local: provider.is_local,
        }
    }
}

/// Milliseconds spent in each phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Timings {
    pub dns: u64,
    pub fetch: u64,
    pub parse: u64,
    pub probe: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub normalized_url: String,
    pub redirect_hops: u32,
    #[serde(rename = "resolvedIPs")]
    pub resolved_ips: Vec<IpAddr>,
    pub timings_ms: Timings,
}

/// Everything a discovery run found out about a website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResult {
    pub name: Option<String>,
    /// At most 200 characters.
    pub description: Option<String>,
    pub api: ApiSection,
    pub source: Source,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<RegistryInfo>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub warnings: Vec<String>,
    pub debug: DebugInfo,
}

pub(crate) fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Accumulates a result over the phases of one run. Only [`finish`] hands out a
/// [`DiscoverResult`].
///
/// [`finish`]: ResultBuilder::finish
pub(crate) struct ResultBuilder {
    started: Instant,
    pub name: Option<String>,
    pub description: Option<String>,
    pub best_url: Option<String>,
    pub candidates: Vec<ApiCandidate>,
    pub source: Source,
    pub domain: String,
    pub registry: Option<RegistryInfo>,
    warnings: Vec<String>,
    pub debug: DebugInfo,
}

impl ResultBuilder {
    pub fn new(domain: String, normalized_url: String) -> ResultBuilder {
        ResultBuilder {
            started: Instant::now(),
            name: None,
            description: None,
            best_url: None,
            candidates: Vec::new(),
            source: Source::Website,
            domain,
            registry: None,
            warnings: Vec::new(),
            debug: DebugInfo {
                normalized_url,
                ..DebugInfo::default()
            },
        }
    }

    pub fn warn<S: Into<String>>(&mut self, warning: S) {
        self.warnings.push(warning.into());
    }

    /// Ends the run with a classified failure.
    pub fn fail(mut self, classification: Classification) -> DiscoverResult {
        self.warn(classification.warning);
        self.finish(classification.status, Some(classification.reason))
    }

    pub fn finish(mut self, status: Status, failure_reason: Option<FailureReason>) -> DiscoverResult {
        self.debug.timings_ms.total = elapsed_ms(self.started);

        let result = DiscoverResult {
            name: self.name,
            description: self.description,
            api: ApiSection {
                best_url: self.best_url,
                candidates: self.candidates,
            },
            source: self.source,
            domain: self.domain,
            registry: self.registry,
            status,
            failure_reason,
            warnings: self.warnings,
            debug: self.debug,
        };

        log_attempt(&result);

        result
    }
}

fn log_attempt(result: &DiscoverResult) {
    let timings = &result.debug.timings_ms;
    let reason = result
        .failure_reason
        .map(|r| r.to_string())
        .unwrap_or_default();

    info!(
        target: "apiscout::attempt",
        domain = %result.domain,
        source = %result.source,
        status = %result.status,
        failure_reason = %reason,
        has_best_url = result.api.best_url.is_some(),
        candidates = result.api.candidates.len(),
        dns_ms = timings.dns,
        fetch_ms = timings.fetch,
        parse_ms = timings.parse,
        probe_ms = timings.probe,
        total_ms = timings.total,
        "discovery attempt"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strum::IntoEnumIterator;

    #[test]
    fn test_reason_wire_names() {
        let names: Vec<String> = FailureReason::iter().map(|r| r.to_string()).collect();

        assert_eq!(
            names,
            vec![
                "INVALID_URL",
                "SSRF_BLOCKED",
                "DNS_FAILED",
                "FETCH_TIMEOUT",
                "FETCH_TOO_LARGE",
                "FETCH_HTTP_ERROR",
                "PARSE_FAILED",
                "NO_METADATA_FOUND",
                "NO_CANDIDATES",
                "PROBE_ALL_FAILED",
            ]
        );

        for reason in FailureReason::iter() {
            assert_eq!(
                serde_json::to_value(reason).unwrap(),
                serde_json::Value::String(reason.to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_classify_safety_errors() {
        use crate::net::{SafetyGate, SafetyPolicy, StaticResolver};

        let resolver = StaticResolver::new().with_host("loop.example", ["127.0.0.1".parse().unwrap()]);
        let gate = SafetyGate::new(SafetyPolicy::default(), Arc::new(resolver));

        let cases = [
            ("https://loop.example/", FailureReason::SsrfBlocked),
            ("http://loop.example/", FailureReason::SsrfBlocked),
            ("https://u:p@loop.example/", FailureReason::SsrfBlocked),
            ("https://gone.example/", FailureReason::DnsFailed),
            ("gopher://loop.example/", FailureReason::InvalidUrl),
            ("https://", FailureReason::InvalidUrl),
        ];

        for (url, reason) in cases {
            let err = gate.validate(url).await.unwrap_err();
            let classification = classify_safety_error(&err);

            assert_eq!(classification.reason, reason, "{}", url);
            assert_eq!(classification.status, Status::Failed);
            assert!(!classification.warning.is_empty());
        }
    }

    #[test]
    fn test_classify_fetch_errors() {
        let classify = |kind| classify_fetch_error(&FetchError::from_kind(kind));

        assert_eq!(classify(FetchErrorKind::TimedOut).reason, FailureReason::FetchTimeout);
        assert_eq!(classify(FetchErrorKind::TimedOut).status, Status::Failed);
        assert_eq!(classify(FetchErrorKind::TooLarge).reason, FailureReason::FetchTooLarge);
        assert_eq!(classify(FetchErrorKind::TooLarge).status, Status::Partial);
        assert_eq!(classify(FetchErrorKind::Blocked).reason, FailureReason::SsrfBlocked);
        assert_eq!(
            classify(FetchErrorKind::TooManyRedirects).reason,
            FailureReason::FetchHttpError
        );
        assert_eq!(classify(FetchErrorKind::ConnectFailed).status, Status::Failed);

        let http = classify_http_status(503);
        assert_eq!(http.reason, FailureReason::FetchHttpError);
        assert_eq!(http.status, Status::Partial);
        assert!(http.warning.contains("503"));
    }

    #[test]
    fn test_serialized_shape() {
        let mut builder = ResultBuilder::new("acme.example".into(), "https://acme.example/".into());
        builder.warn("no name or description found");
        builder.debug.resolved_ips = vec!["93.184.216.34".parse().unwrap()];

        let result = builder.finish(Status::Partial, Some(FailureReason::NoCandidates));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["name"], serde_json::Value::Null);
        assert_eq!(json["api"]["bestUrl"], serde_json::Value::Null);
        assert_eq!(json["source"], "website");
        assert_eq!(json["status"], "partial");
        assert_eq!(json["failureReason"], "NO_CANDIDATES");
        assert_eq!(json["debug"]["normalizedUrl"], "https://acme.example/");
        assert_eq!(json["debug"]["resolvedIPs"][0], "93.184.216.34");
        assert!(json["debug"]["timingsMs"]["total"].is_u64());
        assert!(json.get("registry").is_none());
    }
}
