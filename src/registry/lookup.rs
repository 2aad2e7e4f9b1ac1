use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use super::providers::{KnownProvider, PROVIDERS};

/// Suffixes removed by [`domain_to_slug`]. At most one is stripped.
const SLUG_TLDS: &[&str] = &[".com", ".ai", ".io", ".dev", ".org", ".net", ".co"];

lazy_static! {
    static ref BY_DOMAIN: HashMap<&'static str, &'static KnownProvider> = {
        let mut index = HashMap::new();

        for provider in PROVIDERS {
            for domain in provider.domains {
                index.entry(*domain).or_insert(provider);
            }
        }

        index
    };
    static ref BY_SLUG: HashMap<&'static str, &'static KnownProvider> =
        PROVIDERS.iter().map(|p| (p.slug, p)).collect();
    static ref NON_ALNUM: Regex = Regex::new("[^a-z0-9]+").unwrap();
}

/// Lowercases a domain and removes surrounding whitespace, a trailing dot and a
/// leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();

    match domain.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => domain,
    }
}

fn is_subdomain_of(needle: &str, known: &str) -> bool {
    needle.len() > known.len()
        && needle.ends_with(known)
        && needle.as_bytes()[needle.len() - known.len() - 1] == b'.'
}

/// Whether `host` is `domain` itself or one of its subdomains.
pub fn is_within(host: &str, domain: &str) -> bool {
    let host = normalize_domain(host);
    let domain = normalize_domain(domain);

    !domain.is_empty() && (host == domain || is_subdomain_of(&host, &domain))
}

/// Finds the provider that serves `domain`. An exact match always wins over a
/// subdomain match; among subdomain matches the earliest table entry wins.
pub fn find_by_domain(domain: &str) -> Option<&'static KnownProvider> {
    let needle = normalize_domain(domain);

    if needle.is_empty() {
        return None;
    }

    if let Some(provider) = BY_DOMAIN.get(needle.as_str()) {
        return Some(*provider);
    }

    PROVIDERS
        .iter()
        .find(|p| p.domains.iter().any(|known| is_subdomain_of(&needle, known)))
}

pub fn find_by_slug(slug: &str) -> Option<&'static KnownProvider> {
    BY_SLUG.get(slug.trim().to_ascii_lowercase().as_str()).copied()
}

/// Every provider, in table order.
pub fn all() -> &'static [KnownProvider] {
    PROVIDERS
}

/// Lowercases `text` and joins its alphanumeric runs with single hyphens.
pub fn slugify(text: &str) -> String {
    let lower = text.to_lowercase();

    NON_ALNUM
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Derives an identifier from a domain, e.g. `www.anthropic.com` becomes
/// `anthropic`. Applying it to its own output returns the output unchanged.
pub fn domain_to_slug(domain: &str) -> String {
    let domain = normalize_domain(domain);

    let stem = SLUG_TLDS
        .iter()
        .find_map(|tld| domain.strip_suffix(tld))
        .unwrap_or(domain.as_str());

    slugify(stem)
}
