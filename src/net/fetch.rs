//! Bounded HTTP GETs that go through the safety gate on every hop.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;
use url::{Host, Url};

use super::error::{Error, ErrorKind};
use super::safety::{SafetyGate, ValidatedUrl};

/// What to do when a body grows past [`FetchLimits::max_body_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Stop reading and fail with [`ErrorKind::TooLarge`].
    Abort,
    /// Keep the first `max_body_bytes` and mark the response as truncated.
    Truncate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub max_body_bytes: usize,
    /// Wall-clock budget for the whole operation, redirects and body included.
    pub total_timeout: Duration,
    pub max_hops: u32,
    pub overflow: Overflow,
}

impl FetchLimits {
    /// Limits for fetching a website's page.
    pub const fn page() -> FetchLimits {
        FetchLimits {
            max_body_bytes: 512 * 1024,
            total_timeout: Duration::from_millis(8000),
            max_hops: 3,
            overflow: Overflow::Abort,
        }
    }

    /// Limits for a single API probe. Only the head of the body is ever parsed.
    pub const fn probe() -> FetchLimits {
        FetchLimits {
            max_body_bytes: 32 * 1024,
            total_timeout: Duration::from_millis(2500),
            max_hops: 3,
            overflow: Overflow::Truncate,
        }
    }
}

impl Default for FetchLimits {
    fn default() -> Self {
        FetchLimits::page()
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub limits: FetchLimits,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn new(limits: FetchLimits) -> FetchRequest {
        FetchRequest {
            limits,
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> FetchRequest {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn bearer(self, token: &str) -> FetchRequest {
        self.header("Authorization", &format!("Bearer {}", token))
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL that produced the response, after redirects.
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub redirect_hops: u32,
    /// The addresses the final hop was pinned to.
    pub resolved_ips: Vec<IpAddr>,
    pub truncated: bool,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues GET requests. Statuses outside 2xx are responses, not errors;
/// interpreting them is up to the caller.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, Error>;
}

/// The production [`Fetch`] implementation.
pub struct SafeFetcher {
    gate: SafetyGate,
    user_agent: String,
}

impl SafeFetcher {
    pub fn new<S: Into<String>>(gate: SafetyGate, user_agent: S) -> SafeFetcher {
        SafeFetcher {
            gate,
            user_agent: user_agent.into(),
        }
    }

    /// Builds a client that can only connect to the validated addresses.
    fn pinned_client(&self, validated: &ValidatedUrl) -> Result<Client, Error> {
        let mut builder = Client::builder()
            .redirect(Policy::none())
            .user_agent(self.user_agent.as_str());

        if let Some(Host::Domain(name)) = validated.url.host() {
            let port = validated.url.port_or_known_default().unwrap_or(443);

            let addrs: Vec<SocketAddr> = validated
                .resolved_ips
                .iter()
                .map(|ip| SocketAddr::new(*ip, port))
                .collect();

            builder = builder.resolve_to_addrs(name, &addrs);
        }

        Ok(builder.build()?)
    }

    async fn follow(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let limits = &request.limits;
        let mut current = url.clone();
        let mut hops = 0u32;

        loop {
            let validated = self.gate.check(&current).await?;
            let client = self.pinned_client(&validated)?;

            let mut builder = client.get(current.clone());

            let same_origin = current.origin() == url.origin();

            for (name, value) in &request.headers {
                if !same_origin && is_credential_header(name) {
                    continue;
                }

                builder = builder.header(name.as_str(), value.as_str());
            }

            let res = builder.send().await?;
            let status = res.status();

            debug!("GET {} -> {} (hop {})", current, status.as_u16(), hops);

            if status.is_redirection() {
                let location = res
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty());

                // A 304 or a redirect without a target is a final answer
                if let Some(location) = location {
                    if hops >= limits.max_hops {
                        return Err(Error::from_kind(ErrorKind::TooManyRedirects));
                    }

                    current = current.join(location)?;
                    hops += 1;

                    continue;
                }
            }

            if limits.overflow == Overflow::Abort
                && res
                    .content_length()
                    .is_some_and(|len| len > limits.max_body_bytes as u64)
            {
                return Err(Error::from_kind(ErrorKind::TooLarge));
            }

            let content_type = res
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());

            let (body, truncated) = read_capped(res.bytes_stream(), limits).await?;

            return Ok(FetchResponse {
                final_url: current,
                status: status.as_u16(),
                content_type,
                body,
                redirect_hops: hops,
                resolved_ips: validated.resolved_ips,
                truncated,
            });
        }
    }
}

/// Headers that never follow a redirect to another origin.
fn is_credential_header(name: &str) -> bool {
    ["authorization", "cookie", "proxy-authorization"]
        .iter()
        .any(|h| name.eq_ignore_ascii_case(h))
}

/// Reads a body chunk by chunk, stopping as soon as the ceiling is crossed.
async fn read_capped<S>(stream: S, limits: &FetchLimits) -> Result<(Bytes, bool), Error>
where
    S: Stream<Item = reqwest::Result<Bytes>>,
{
    futures_util::pin_mut!(stream);

    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let remaining = limits.max_body_bytes - body.len();

        if chunk.len() > remaining {
            return match limits.overflow {
                Overflow::Abort => Err(Error::from_kind(ErrorKind::TooLarge)),
                Overflow::Truncate => {
                    body.extend_from_slice(&chunk[..remaining]);

                    Ok((Bytes::from(body), true))
                }
            };
        }

        body.extend_from_slice(&chunk);
    }

    Ok((Bytes::from(body), false))
}

#[async_trait]
impl Fetch for SafeFetcher {
    async fn get(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, Error> {
        match tokio::time::timeout(request.limits.total_timeout, self.follow(url, request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::from_kind(ErrorKind::TimedOut)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{SafetyPolicy, StaticResolver};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Mock servers listen on 127.0.0.1 over plain http
    fn dev_fetcher() -> SafeFetcher {
        let policy = SafetyPolicy {
            allow_insecure_scheme: true,
            allow_loopback: true,
        };

        SafeFetcher::new(
            SafetyGate::new(policy, Arc::new(StaticResolver::new())),
            "apiscout-test",
        )
    }

    fn limits(max_body_bytes: usize, overflow: Overflow) -> FetchLimits {
        FetchLimits {
            max_body_bytes,
            overflow,
            ..FetchLimits::page()
        }
    }

    async fn mount(server: &MockServer, at: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(response)
            .mount(server)
            .await;
    }

    fn url(server: &MockServer, at: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), at)).unwrap()
    }

    #[tokio::test]
    async fn test_body_cap_aborts() {
        let server = MockServer::start().await;
        mount(&server, "/big", ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 4096])).await;

        let res = dev_fetcher()
            .get(&url(&server, "/big"), &FetchRequest::new(limits(1024, Overflow::Abort)))
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::TooLarge);
    }

    #[tokio::test]
    async fn test_body_cap_truncates() {
        let server = MockServer::start().await;
        mount(&server, "/big", ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 4096])).await;

        let res = dev_fetcher()
            .get(&url(&server, "/big"), &FetchRequest::new(limits(1024, Overflow::Truncate)))
            .await
            .expect("truncated fetch should succeed");

        assert_eq!(res.body.len(), 1024);
        assert!(res.truncated);
    }

    #[tokio::test]
    async fn test_deadline_covers_slow_responses() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/slow",
            ResponseTemplate::new(200).set_delay(Duration::from_millis(800)),
        )
        .await;

        let request = FetchRequest::new(FetchLimits {
            total_timeout: Duration::from_millis(100),
            ..FetchLimits::page()
        });

        let res = dev_fetcher().get(&url(&server, "/slow"), &request).await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_redirects_are_followed_and_counted() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/start",
            ResponseTemplate::new(302).insert_header("location", "/end"),
        )
        .await;
        mount(&server, "/end", ResponseTemplate::new(200).set_body_string("done")).await;

        let res = dev_fetcher()
            .get(&url(&server, "/start"), &FetchRequest::new(FetchLimits::page()))
            .await
            .unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(res.redirect_hops, 1);
        assert_eq!(res.final_url.path(), "/end");
        assert_eq!(res.text(), "done");
    }

    #[tokio::test]
    async fn test_redirect_ceiling() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/loop",
            ResponseTemplate::new(301).insert_header("location", "/loop"),
        )
        .await;

        let res = dev_fetcher()
            .get(&url(&server, "/loop"), &FetchRequest::new(FetchLimits::page()))
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::TooManyRedirects);
    }

    #[tokio::test]
    async fn test_redirect_to_metadata_address_is_blocked() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/hop",
            ResponseTemplate::new(307)
                .insert_header("location", "http://169.254.169.254/latest/meta-data"),
        )
        .await;

        let res = dev_fetcher()
            .get(&url(&server, "/hop"), &FetchRequest::new(FetchLimits::page()))
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::Blocked);
    }

    #[tokio::test]
    async fn test_error_statuses_are_responses() {
        let server = MockServer::start().await;
        mount(&server, "/v1/models", ResponseTemplate::new(401)).await;

        let res = dev_fetcher()
            .get(&url(&server, "/v1/models"), &FetchRequest::new(FetchLimits::probe()))
            .await
            .unwrap();

        assert_eq!(res.status, 401);
        assert!(!res.is_success());
    }

    #[tokio::test]
    async fn test_loopback_refused_without_dev_policy() {
        let server = MockServer::start().await;
        mount(&server, "/", ResponseTemplate::new(200)).await;

        let fetcher = SafeFetcher::new(
            SafetyGate::new(
                SafetyPolicy {
                    allow_insecure_scheme: true,
                    allow_loopback: false,
                },
                Arc::new(StaticResolver::new()),
            ),
            "apiscout-test",
        );

        let res = fetcher
            .get(&url(&server, "/"), &FetchRequest::new(FetchLimits::page()))
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::Blocked);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_credentials_stay_with_their_origin() {
        let origin = MockServer::start().await;
        let elsewhere = MockServer::start().await;

        mount(
            &origin,
            "/v1/models",
            ResponseTemplate::new(302).insert_header("location", "/v2/models"),
        )
        .await;
        mount(
            &origin,
            "/v2/models",
            ResponseTemplate::new(302)
                .insert_header("location", format!("{}/models", elsewhere.uri()).as_str()),
        )
        .await;
        mount(&elsewhere, "/models", ResponseTemplate::new(200)).await;

        let request = FetchRequest::new(FetchLimits::probe())
            .bearer("sk-secret")
            .header("Cookie", "session=1")
            .header("Accept", "application/json");

        let res = dev_fetcher()
            .get(&url(&origin, "/v1/models"), &request)
            .await
            .unwrap();

        assert_eq!(res.status, 200);
        assert_eq!(res.redirect_hops, 2);

        let same_origin = origin.received_requests().await.unwrap();
        assert_eq!(same_origin.len(), 2);
        for req in &same_origin {
            assert_eq!(req.headers.get("authorization").unwrap(), "Bearer sk-secret");
        }

        let other = elsewhere.received_requests().await.unwrap();
        assert_eq!(other.len(), 1);
        assert!(other[0].headers.get("authorization").is_none());
        assert!(other[0].headers.get("cookie").is_none());
        assert_eq!(other[0].headers.get("accept").unwrap(), "application/json");
    }
}
