//! Candidate API base URLs from page text, links and naming conventions.

use lazy_static::lazy_static;
use regex::Regex;
use url::{Host, Url};

use super::candidate::{ApiCandidate, CandidateSet, Evidence};
use super::extract::Page;

pub const BASE_URL_TEXT_CONFIDENCE: u8 = 50;
pub const HTML_LINK_CONFIDENCE: u8 = 40;
pub const HEURISTIC_CONFIDENCE: u8 = 20;
/// Initial confidence of the subdomains tried before the page is fetched.
pub const DIRECT_PROBE_CONFIDENCE: u8 = 40;

/// Subdomains commonly used for API hosts and developer consoles.
pub const DIRECT_PROBE_SUBDOMAINS: &[&str] = &["api", "studio", "developers", "platform"];

lazy_static! {
    static ref BASE_URL_TEXT: Regex = Regex::new(
        r#"(?i)\b(?:base|api)\s*(?:url|endpoint|base)\s*[:=]\s*["'`]?(https?://[^\s"'`<>]+)"#
    )
    .unwrap();
}

/// Adds every candidate the page supports, strongest evidence first, followed
/// by the `api.` subdomain heuristic.
pub fn mine_candidates(page: &Page, page_url: &Url, domain: &str, candidates: &mut CandidateSet) {
    for url in mine_text(&page.text) {
        candidates.insert(ApiCandidate::new(
            &url,
            Evidence::BaseUrlText,
            BASE_URL_TEXT_CONFIDENCE,
        ));
    }

    for url in mine_links(&page.links, page_url) {
        candidates.insert(ApiCandidate::new(&url, Evidence::HtmlLink, HTML_LINK_CONFIDENCE));
    }

    if let Some(heuristic) = heuristic_candidate(domain) {
        candidates.insert(heuristic);
    }
}

/// URLs introduced as a base URL or endpoint, e.g. `API base: https://...`.
pub fn mine_text(text: &str) -> Vec<String> {
    BASE_URL_TEXT
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')', ']']))
        .filter(|url| Url::parse(url).is_ok_and(|u| u.has_host()))
        .map(str::to_string)
        .collect()
}

/// Origins of links that look like they lead to an API or its documentation.
pub fn mine_links(links: &[String], page_url: &Url) -> Vec<String> {
    links
        .iter()
        .filter_map(|href| page_url.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .filter(|url| {
            let host = url.host_str().unwrap_or_default();
            let path = url.path();

            host.starts_with("api.")
                || host.starts_with("developers.")
                || path.contains("/api")
                || path.contains("/docs")
        })
        .map(|url| url.origin().ascii_serialization())
        .filter(|origin| origin != "null")
        .collect()
}

/// `https://api.{domain}`. IP addresses have no subdomains.
pub fn heuristic_candidate(domain: &str) -> Option<ApiCandidate> {
    if domain.is_empty() || is_ip_literal(domain) {
        return None;
    }

    Some(ApiCandidate::new(
        &format!("https://api.{}", domain),
        Evidence::ApiSubdomainHeuristic,
        HEURISTIC_CONFIDENCE,
    ))
}

fn is_ip_literal(host: &str) -> bool {
    matches!(Host::parse(host), Ok(Host::Ipv4(_)) | Ok(Host::Ipv6(_)))
}

/// Base URLs tried before the page is fetched: the conventional subdomains of
/// `domain` and then the bare domain. IP hosts only get the site's origin.
pub fn direct_probe_bases(site: &Url, domain: &str) -> Vec<String> {
    let mut bases: Vec<String> = Vec::new();

    if site.host_str().is_none() {
        return bases;
    }

    if is_ip_literal(domain) {
        bases.push(site.origin().ascii_serialization());

        return bases;
    }

    for sub in DIRECT_PROBE_SUBDOMAINS {
        bases.push(format!("{}://{}.{}", site.scheme(), sub, domain));
    }

    let port = site.port().map(|p| format!(":{}", p)).unwrap_or_default();

    bases.push(format!("{}://{}{}", site.scheme(), domain, port));

    bases
}
