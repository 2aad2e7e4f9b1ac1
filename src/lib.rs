//! apiscout finds the API behind an LLM provider's website.
//!
//! Given a website URL, [`discover_provider`] works out the organization's
//! name and description and, when it can verify one, the base URL of its API.
//! Well-known providers are answered from a built-in [`registry`]; other sites
//! are probed and scraped through the guarded HTTP stack in [`net`], which
//! refuses to contact loopback, private or link-local addresses.
//!
//! ```no_run
//! # async fn run() {
//! let result = apiscout::discover_provider("https://console.groq.com").await;
//!
//! println!("{:?} {:?}", result.status, result.api.best_url);
//! # }
//! ```

pub mod discovery;
pub mod net;
pub mod registry;

pub use discovery::{discover_provider, DiscoverOptions, DiscoverResult, Discoverer, FailureReason, Status};
pub use registry::domain_to_slug;
