//! The registry of well-known API providers.
//!
//! A fixed table of providers whose API endpoints are already known, keyed by
//! the domains their websites live on. When a discovery request names one of
//! these domains, the answer comes straight from the table and no network
//! request is issued.
//!
//! Domain lookup first tries an exact match on the normalized domain (lowercase,
//! no leading `www.`, no trailing dot) and then falls back to a subdomain match,
//! so `platform.openai.com` resolves to the `openai` entry. The indices are
//! built on first use and never change afterwards.

mod lookup;
mod providers;

pub use lookup::{all, domain_to_slug, find_by_domain, find_by_slug, is_within, normalize_domain, slugify};
pub use providers::{AuthType, Compatibility, KnownProvider, ProbeSpec};
