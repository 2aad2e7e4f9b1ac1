//! Provider discovery: from a website URL to its organization and a verified
//! API base URL.
//!
//! A run goes through these phases, stopping at the first one that settles
//! the answer:
//!
//! 1. The input is normalized and checked by the [`SafetyGate`]. A refused URL
//!    ends the run before any request is made.
//! 2. Domains in the known-provider registry are answered from the table.
//! 3. The conventional API subdomains and the site itself are probed for a
//!    models listing. A verified hit ends the run after a best-effort lookup of
//!    the site's name.
//! 4. The site's page is fetched and parsed for its name and description, and
//!    candidate base URLs are mined from its text and links. A failed fetch
//!    does not end the run; the `api.` subdomain heuristic is still tried.
//! 5. The strongest candidates are probed and the best one that passes
//!    selection is reported.
//!
//! Nothing is retried and nothing is persisted. Every path ends in a complete
//! [`DiscoverResult`]; errors are reported through its status, failure reason
//! and warnings.

pub mod candidate;
pub mod extract;
pub mod miner;
pub mod probe;
pub mod result;
pub mod select;

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::debug;
use url::Url;

pub use candidate::{ApiCandidate, CandidateSet, ConfidenceLabel, Evidence, ModelSample, ProbeOutcome, ScoreDecision};
pub use probe::{ProbeEngine, ProbeResult};
pub use result::{
    classify_fetch_error, classify_http_status, classify_parse_error, classify_safety_error, ApiSection,
    Classification, DebugInfo, DiscoverResult, FailureReason, RegistryInfo, Source, Status, Timings,
};
pub use select::select_best;

use crate::net::{Fetch, FetchLimits, FetchRequest, HickoryResolver, SafeFetcher, SafetyGate, SafetyPolicy};
use crate::registry::{self, KnownProvider};
use result::{elapsed_ms, ResultBuilder};

const REGISTRY_CONFIDENCE: u8 = 100;

#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Sent as a bearer token with probes of the site's own domain and its
    /// subdomains.
    pub api_key: Option<String>,
    pub policy: SafetyPolicy,
    pub page_limits: FetchLimits,
    pub probe_limits: FetchLimits,
    /// How many mined candidates are probed. Candidates already probed during
    /// the direct phase do not count.
    pub max_probed_candidates: usize,
    pub user_agent: String,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        DiscoverOptions {
            api_key: None,
            policy: SafetyPolicy::default(),
            page_limits: FetchLimits::page(),
            probe_limits: FetchLimits::probe(),
            max_probed_candidates: 4,
            user_agent: concat!("apiscout/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Runs discoveries. A `Discoverer` holds no per-run state and can be shared
/// between concurrent runs.
pub struct Discoverer {
    gate: SafetyGate,
    fetcher: Arc<dyn Fetch>,
    options: DiscoverOptions,
}

impl Discoverer {
    /// A discoverer that resolves names with the system configuration and
    /// fetches through a [`SafeFetcher`].
    pub fn new(options: DiscoverOptions) -> Discoverer {
        let gate = SafetyGate::new(options.policy, Arc::new(HickoryResolver::from_system_conf()));
        let fetcher = Arc::new(SafeFetcher::new(gate.clone(), options.user_agent.clone()));

        Discoverer::with_parts(gate, fetcher, options)
    }

    pub fn with_parts(gate: SafetyGate, fetcher: Arc<dyn Fetch>, options: DiscoverOptions) -> Discoverer {
        Discoverer {
            gate,
            fetcher,
            options,
        }
    }

    pub fn options(&self) -> &DiscoverOptions {
        &self.options
    }

    pub async fn discover(&self, website_url: &str) -> DiscoverResult {
        let input = normalize_input(website_url);
        let mut report = ResultBuilder::new(input_domain(&input), input.clone());

        if input.is_empty() {
            return report.fail(Classification::new(
                FailureReason::InvalidUrl,
                Status::Failed,
                "no URL was given".to_string(),
            ));
        }

        let started = Instant::now();
        let validated = self.gate.validate(&input).await;
        report.debug.timings_ms.dns = elapsed_ms(started);

        let validated = match validated {
            Ok(validated) => validated,
            Err(err) => {
                debug!("refusing {}: {}", input, err);

                return report.fail(classify_safety_error(&err));
            }
        };

        let site = validated.url;
        let domain = registry::normalize_domain(site.host_str().unwrap_or_default());

        report.domain = domain.clone();
        report.debug.normalized_url = site.to_string();
        report.debug.resolved_ips = validated.resolved_ips;

        if let Some(provider) = registry::find_by_domain(&domain) {
            debug!("{} is the known provider {}", domain, provider.slug);

            return from_registry(report, provider);
        }

        let engine = ProbeEngine::new(
            self.fetcher.clone(),
            self.options.probe_limits,
            self.options.api_key.as_deref(),
        )
        .with_key_domain(&domain);

        let mut probes: HashMap<String, ProbeResult> = HashMap::new();

        let mut direct = CandidateSet::new();

        for base in miner::direct_probe_bases(&site, &domain) {
            direct.insert(ApiCandidate::new(
                &base,
                Evidence::ApiProbe,
                miner::DIRECT_PROBE_CONFIDENCE,
            ));
        }

        let started = Instant::now();
        probe_all(&engine, &mut direct, usize::MAX, &mut probes).await;
        report.debug.timings_ms.probe += elapsed_ms(started);

        if let Some(best_url) = select_best(direct.as_slice()).map(|c| c.url().to_string()) {
            debug!("direct probing found {}", best_url);

            report.best_url = Some(best_url);
            report.candidates = direct
                .into_vec()
                .into_iter()
                .filter(ApiCandidate::has_passing_probe)
                .collect();

            self.lookup_metadata(&site, &mut report).await;

            return report.finish(Status::Ok, None);
        }

        let mut candidates = CandidateSet::new();

        let fetch_failure = self.scrape(&site, &domain, &mut report, &mut candidates).await;

        if let Some(failure) = &fetch_failure {
            report.warn(failure.warning.clone());

            // mining never ran, the heuristic still applies
            if let Some(heuristic) = miner::heuristic_candidate(&domain) {
                candidates.insert(heuristic);
            }
        }

        let started = Instant::now();
        probe_all(
            &engine,
            &mut candidates,
            self.options.max_probed_candidates,
            &mut probes,
        )
        .await;
        report.debug.timings_ms.probe += elapsed_ms(started);

        report.best_url = select_best(candidates.as_slice()).map(|c| c.url().to_string());

        let (status, reason) = final_status(&mut report, &candidates, fetch_failure);

        report.candidates = candidates.into_vec();
        report.finish(status, reason)
    }

    fn page_request(&self) -> FetchRequest {
        FetchRequest::new(self.options.page_limits).header("Accept", "text/html,application/xhtml+xml")
    }

    /// Fetches and parses the site, filling in its metadata and mining
    /// candidates. Returns the classified failure if the page was unusable.
    async fn scrape(
        &self,
        site: &Url,
        domain: &str,
        report: &mut ResultBuilder,
        candidates: &mut CandidateSet,
    ) -> Option<Classification> {
        let started = Instant::now();
        let response = self.fetcher.get(site, &self.page_request()).await;
        report.debug.timings_ms.fetch = elapsed_ms(started);

        let response = match response {
            Ok(response) => response,
            Err(err) => return Some(classify_fetch_error(&err)),
        };

        report.debug.redirect_hops = response.redirect_hops;

        if !response.resolved_ips.is_empty() {
            report.debug.resolved_ips = response.resolved_ips.clone();
        }

        if !response.is_success() {
            return Some(classify_http_status(response.status));
        }

        let started = Instant::now();
        let page = extract::parse_page(&response.body, response.content_type.as_deref());
        report.debug.timings_ms.parse = elapsed_ms(started);

        let page = match page {
            Ok(page) => page,
            Err(err) => return Some(classify_parse_error(&err)),
        };

        if page.name.is_none() && page.description.is_none() {
            report.warn("no name or description found on the website");
        }

        miner::mine_candidates(&page, &response.final_url, domain, candidates);

        report.name = page.name;
        report.description = page.description;

        None
    }

    /// Best-effort name and description lookup. Failures are ignored.
    async fn lookup_metadata(&self, site: &Url, report: &mut ResultBuilder) {
        let started = Instant::now();
        let response = self.fetcher.get(site, &self.page_request()).await;
        report.debug.timings_ms.fetch = elapsed_ms(started);

        let response = match response {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!("metadata lookup for {} got HTTP {}", site, response.status);
                return;
            }
            Err(err) => {
                debug!("metadata lookup for {} failed: {}", site, err);
                return;
            }
        };

        report.debug.redirect_hops = response.redirect_hops;

        let started = Instant::now();

        if let Ok(page) = extract::parse_page(&response.body, response.content_type.as_deref()) {
            report.name = page.name;
            report.description = page.description;
        }

        report.debug.timings_ms.parse = elapsed_ms(started);
    }
}

/// Probes the strongest `limit` candidates that have not been probed yet in
/// this run, then applies every known probe result to the set.
async fn probe_all(
    engine: &ProbeEngine,
    candidates: &mut CandidateSet,
    limit: usize,
    cache: &mut HashMap<String, ProbeResult>,
) {
    let mut ranked: Vec<&ApiCandidate> = candidates.iter().collect();
    ranked.sort_by_key(|c| Reverse(c.confidence()));

    let fresh: Vec<String> = ranked
        .iter()
        .map(|c| c.url().to_string())
        .filter(|url| !cache.contains_key(url))
        .take(limit)
        .collect();

    let results = join_all(fresh.iter().map(|base| engine.probe_candidate(base))).await;

    cache.extend(fresh.into_iter().zip(results));

    for candidate in candidates.iter_mut() {
        if let Some(result) = cache.get(candidate.url()) {
            candidate.apply_probe(result);
        }
    }
}

fn from_registry(mut report: ResultBuilder, provider: &KnownProvider) -> DiscoverResult {
    report.source = Source::Registry;
    report.name = Some(provider.name.to_string());
    report.description = Some(provider.description.to_string());
    report.registry = Some(RegistryInfo::from(provider));

    let Some(url) = provider.base_url() else {
        report.warn(format!(
            "{} endpoints are specific to each deployment, the base URL has to be configured by hand",
            provider.name
        ));

        return report.finish(Status::Partial, None);
    };

    let candidate = ApiCandidate::new(url, Evidence::Registry, REGISTRY_CONFIDENCE);

    report.best_url = select_best(std::slice::from_ref(&candidate)).map(|c| c.url().to_string());
    report.candidates = vec![candidate];

    report.finish(Status::Ok, None)
}

/// Derives the final status of a run that got past the direct-probe phase.
fn final_status(
    report: &mut ResultBuilder,
    candidates: &CandidateSet,
    fetch_failure: Option<Classification>,
) -> (Status, Option<FailureReason>) {
    let viable = candidates.iter().any(ApiCandidate::is_viable);

    if let Some(failure) = fetch_failure {
        let status = if report.best_url.is_some() || viable {
            Status::Partial
        } else {
            failure.status
        };

        return (status, Some(failure.reason));
    }

    if report.name.is_none() && report.description.is_none() && !viable {
        return (Status::Failed, Some(FailureReason::NoMetadataFound));
    }

    if candidates.is_empty() {
        report.warn("no API candidates were found");

        return (Status::Partial, Some(FailureReason::NoCandidates));
    }

    let mut probed = candidates.iter().filter(|c| c.was_probed()).peekable();

    if probed.peek().is_some() && probed.all(ApiCandidate::is_unreachable) {
        report.warn("none of the API candidates could be reached");

        return (Status::Partial, Some(FailureReason::ProbeAllFailed));
    }

    if report.best_url.is_none() {
        report.warn("no API candidate could be verified");

        return (Status::Partial, None);
    }

    (Status::Ok, None)
}

/// Trims the input and assumes `https://` when no scheme is given.
fn normalize_input(raw: &str) -> String {
    let raw = raw.trim();

    if raw.is_empty() || raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

/// The domain reported for runs that end before the URL is validated.
fn input_domain(input: &str) -> String {
    Url::parse(input)
        .ok()
        .and_then(|url| url.host_str().map(registry::normalize_domain))
        .unwrap_or_else(|| input.to_string())
}

/// Discovers a provider with the default options.
pub async fn discover_provider(website_url: &str) -> DiscoverResult {
    Discoverer::new(DiscoverOptions::default())
        .discover(website_url)
        .await
}
