//! Outbound network plumbing. Nothing in the crate talks to the network except
//! through this module.
//!
//! Every request goes through two layers:
//! - The [`SafetyGate`] decides whether a URL may be contacted at all. It checks
//!   the scheme, rejects embedded credentials and control characters, and
//!   resolves the host so that names pointing only at loopback, private or
//!   link-local addresses are refused.
//! - The [`SafeFetcher`] performs the request. It pins the connection to the
//!   addresses the gate approved, follows redirects by hand (re-validating every
//!   hop), enforces a single wall-clock deadline and caps the body while it is
//!   still streaming.
//!
//! DNS and HTTP are both behind traits ([`Resolve`] and [`Fetch`]) so the
//! discovery pipeline can be driven without a network.

mod error;
mod fetch;
mod resolver;
mod safety;

pub use error::{Error as FetchError, ErrorKind as FetchErrorKind};
pub use fetch::{Fetch, FetchLimits, FetchRequest, FetchResponse, Overflow, SafeFetcher};
pub use resolver::{Family, HickoryResolver, Resolve, ResolveError, StaticResolver};
pub use safety::{is_blocked_ip, SafetyError, SafetyGate, SafetyPolicy, ValidatedUrl};
