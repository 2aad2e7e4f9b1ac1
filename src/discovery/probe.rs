//! Probing candidate base URLs for a models listing.
//!
//! Every path in [`PROBE_PATHS`] is requested concurrently. A 200 whose body
//! lists models settles the probe at once and the remaining requests are
//! dropped; otherwise the answers are ranked once all of them are in.

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::candidate::{ModelSample, ProbeOutcome};
use crate::net::{Fetch, FetchError, FetchLimits, FetchRequest};
use crate::registry;

/// Paths under which OpenAI style APIs list their models.
pub const PROBE_PATHS: &[&str] = &[
    "/v1/models",
    "/studio/v1/models",
    "/v2/models",
    "/api/v1/models",
    "/v1/engines",
    "/models",
];

/// Model identifiers kept from a listing.
pub const MAX_MODEL_IDS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// A path answered 200, 401 or 403.
    Responded {
        outcome: ProbeOutcome,
        models: Option<ModelSample>,
    },
    /// The host answered, but never with a status that proves an API.
    Inconclusive,
    /// No request got an answer.
    Unreachable,
}

impl ProbeResult {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProbeResult::Responded { outcome, .. } => Some(outcome.status),
            _ => None,
        }
    }
}

/// The response shapes a models listing may take, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumIter)]
enum SniffStrategy {
    /// `{"data": [{"id": ...}]}`
    DataArray,
    /// `{"models": [{"name": ...}]}`
    ModelsArray,
    /// `[{"id": ...}]`
    BareArray,
}

impl SniffStrategy {
    fn entries(self, body: &Value) -> Option<&Vec<Value>> {
        match self {
            SniffStrategy::DataArray => body.get("data")?.as_array(),
            SniffStrategy::ModelsArray => body.get("models")?.as_array(),
            SniffStrategy::BareArray => body.as_array(),
        }
    }

    fn id_keys(self) -> &'static [&'static str] {
        match self {
            SniffStrategy::DataArray => &["id", "name"],
            SniffStrategy::ModelsArray | SniffStrategy::BareArray => &["id", "name", "model"],
        }
    }

    fn sniff(self, body: &Value) -> Option<ModelSample> {
        let keys = self.id_keys();

        let ids: Vec<&str> = self
            .entries(body)?
            .iter()
            .filter_map(|entry| keys.iter().find_map(|k| entry.get(*k)?.as_str()))
            .filter(|id| !id.is_empty())
            .collect();

        if ids.is_empty() {
            return None;
        }

        Some(ModelSample {
            count: ids.len(),
            ids: ids.iter().take(MAX_MODEL_IDS).map(|id| id.to_string()).collect(),
        })
    }
}

/// Extracts model identifiers from a models listing. Returns `None` for bodies
/// that are not JSON or do not list any models.
pub fn sniff_models(body: &[u8]) -> Option<ModelSample> {
    use strum::IntoEnumIterator;

    let body: Value = serde_json::from_slice(body).ok()?;

    SniffStrategy::iter().find_map(|strategy| strategy.sniff(&body))
}

pub struct ProbeEngine {
    fetcher: Arc<dyn Fetch>,
    request: FetchRequest,
    authorized: Option<FetchRequest>,
    key_domain: Option<String>,
}

impl ProbeEngine {
    pub fn new(fetcher: Arc<dyn Fetch>, limits: FetchLimits, api_key: Option<&str>) -> ProbeEngine {
        let request = FetchRequest::new(limits).header("Accept", "application/json");
        let authorized = api_key.map(|key| request.clone().bearer(key));

        ProbeEngine {
            fetcher,
            request,
            authorized,
            key_domain: None,
        }
    }

    /// Sends the API key only to `domain` and its subdomains. Other hosts are
    /// probed without credentials.
    pub fn with_key_domain(mut self, domain: &str) -> ProbeEngine {
        self.key_domain = Some(domain.to_string());
        self
    }

    fn request_for(&self, url: &Url) -> &FetchRequest {
        let Some(authorized) = &self.authorized else {
            return &self.request;
        };

        let trusted = match &self.key_domain {
            Some(domain) => url
                .host_str()
                .is_some_and(|host| registry::is_within(host, domain)),
            None => true,
        };

        if trusted {
            authorized
        } else {
            &self.request
        }
    }

    async fn probe_path(&self, base: &str, path: &str) -> Result<(u16, Option<ModelSample>), FetchError> {
        let url = Url::parse(&format!("{}{}", base, path))?;
        let response = self.fetcher.get(&url, self.request_for(&url)).await?;

        let models = if response.status == 200 {
            sniff_models(&response.body)
        } else {
            None
        };

        Ok((response.status, models))
    }

    pub async fn probe_candidate(&self, base: &str) -> ProbeResult {
        let base = base.trim_end_matches('/');

        let mut pending: FuturesUnordered<_> = PROBE_PATHS
            .iter()
            .enumerate()
            .map(|(i, path)| async move { (i, self.probe_path(base, path).await) })
            .collect();

        let mut statuses: Vec<Option<u16>> = vec![None; PROBE_PATHS.len()];

        while let Some((i, answer)) = pending.next().await {
            match answer {
                Ok((200, Some(models))) => {
                    debug!("{}{} lists {} models", base, PROBE_PATHS[i], models.count);

                    return ProbeResult::Responded {
                        outcome: ProbeOutcome {
                            path: PROBE_PATHS[i].to_string(),
                            status: 200,
                        },
                        models: Some(models),
                    };
                }
                Ok((status, _)) => statuses[i] = Some(status),
                Err(err) => debug!("probe {}{} failed: {}", base, PROBE_PATHS[i], err),
            }
        }

        let responded = |wanted: &[u16]| {
            statuses
                .iter()
                .position(|s| s.is_some_and(|s| wanted.contains(&s)))
                .map(|i| ProbeResult::Responded {
                    outcome: ProbeOutcome {
                        path: PROBE_PATHS[i].to_string(),
                        status: statuses[i].unwrap_or_default(),
                    },
                    models: None,
                })
        };

        if let Some(result) = responded(&[200]).or_else(|| responded(&[401, 403])) {
            return result;
        }

        if statuses.iter().any(Option::is_some) {
            ProbeResult::Inconclusive
        } else {
            ProbeResult::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{FetchErrorKind, FetchResponse};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers from a fixed table. Paths marked `None` never answer.
    struct TableFetcher {
        answers: HashMap<String, Option<(u16, &'static str)>>,
        seen_headers: Mutex<Vec<(String, String)>>,
    }

    impl TableFetcher {
        fn new(answers: &[(&str, Option<(u16, &'static str)>)]) -> Arc<TableFetcher> {
            Arc::new(TableFetcher {
                answers: answers.iter().map(|(u, a)| (u.to_string(), *a)).collect(),
                seen_headers: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Fetch for TableFetcher {
        async fn get(&self, url: &Url, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
            self.seen_headers
                .lock()
                .unwrap()
                .extend(request.headers.iter().cloned());

            match self.answers.get(url.as_str()) {
                Some(Some((status, body))) => Ok(FetchResponse {
                    final_url: url.clone(),
                    status: *status,
                    content_type: Some("application/json".into()),
                    body: Bytes::from_static(body.as_bytes()),
                    redirect_hops: 0,
                    resolved_ips: Vec::new(),
                    truncated: false,
                }),
                Some(None) => std::future::pending().await,
                None => Err(FetchError::from_kind(FetchErrorKind::ConnectFailed)),
            }
        }
    }

    fn engine(fetcher: Arc<TableFetcher>) -> ProbeEngine {
        ProbeEngine::new(fetcher, FetchLimits::probe(), None)
    }

    #[test]
    fn test_sniff_shapes() {
        let data = sniff_models(br#"{"object":"list","data":[{"id":"m1"},{"id":"m2"}]}"#).unwrap();
        assert_eq!(data.ids, vec!["m1", "m2"]);
        assert_eq!(data.count, 2);

        let models = sniff_models(br#"{"models":[{"model":"llama3"},{"name":"qwen"}]}"#).unwrap();
        assert_eq!(models.ids, vec!["llama3", "qwen"]);

        let bare = sniff_models(br#"[{"id":"a"},{"other":1},{"name":"b"}]"#).unwrap();
        assert_eq!(bare.ids, vec!["a", "b"]);

        assert_eq!(sniff_models(br#"{"data":[]}"#), None);
        assert_eq!(sniff_models(br#"{"data":[{"id":"m1"}"#), None);
        assert_eq!(sniff_models(b"<html></html>"), None);
    }

    #[test]
    fn test_sniff_caps_ids_but_keeps_count() {
        let listing: Vec<Value> = (0..35).map(|i| serde_json::json!({ "id": format!("m{}", i) })).collect();
        let body = serde_json::to_vec(&serde_json::json!({ "data": listing })).unwrap();

        let sample = sniff_models(&body).unwrap();

        assert_eq!(sample.ids.len(), MAX_MODEL_IDS);
        assert_eq!(sample.ids[0], "m0");
        assert_eq!(sample.count, 35);
    }

    #[tokio::test]
    async fn test_model_listing_short_circuits() {
        // every other path hangs forever
        let fetcher = TableFetcher::new(&[
            ("https://api.acme.example/v1/models", Some((200, r#"{"data":[{"id":"m1"}]}"#))),
            ("https://api.acme.example/studio/v1/models", None),
            ("https://api.acme.example/v2/models", None),
            ("https://api.acme.example/api/v1/models", None),
            ("https://api.acme.example/v1/engines", None),
            ("https://api.acme.example/models", None),
        ]);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            engine(fetcher).probe_candidate("https://api.acme.example/"),
        )
        .await
        .expect("probe should not wait for the hanging paths");

        assert_eq!(
            result,
            ProbeResult::Responded {
                outcome: ProbeOutcome {
                    path: "/v1/models".into(),
                    status: 200
                },
                models: Some(ModelSample {
                    ids: vec!["m1".into()],
                    count: 1
                }),
            }
        );
    }

    #[tokio::test]
    async fn test_ranking_without_models() {
        let fetcher = TableFetcher::new(&[
            ("https://api.acme.example/v1/models", Some((401, "{}"))),
            ("https://api.acme.example/v2/models", Some((200, "ok"))),
            ("https://api.acme.example/models", Some((404, ""))),
        ]);

        let result = engine(fetcher).probe_candidate("https://api.acme.example").await;
        assert_eq!(result.status(), Some(200));

        let fetcher = TableFetcher::new(&[
            ("https://api.acme.example/v1/models", Some((404, ""))),
            ("https://api.acme.example/v1/engines", Some((403, ""))),
        ]);

        let result = engine(fetcher).probe_candidate("https://api.acme.example").await;
        assert_eq!(
            result,
            ProbeResult::Responded {
                outcome: ProbeOutcome {
                    path: "/v1/engines".into(),
                    status: 403
                },
                models: None,
            }
        );
    }

    #[tokio::test]
    async fn test_inconclusive_and_unreachable() {
        let fetcher = TableFetcher::new(&[("https://acme.example/models", Some((404, "")))]);
        assert_eq!(
            engine(fetcher).probe_candidate("https://acme.example").await,
            ProbeResult::Inconclusive
        );

        let fetcher = TableFetcher::new(&[]);
        assert_eq!(
            engine(fetcher).probe_candidate("https://acme.example").await,
            ProbeResult::Unreachable
        );
    }

    #[tokio::test]
    async fn test_api_key_sent_as_bearer() {
        let fetcher = TableFetcher::new(&[]);
        let engine = ProbeEngine::new(fetcher.clone(), FetchLimits::probe(), Some("sk-test"));

        engine.probe_candidate("https://acme.example").await;

        let headers = fetcher.seen_headers.lock().unwrap();
        assert!(headers.contains(&("Authorization".into(), "Bearer sk-test".into())));
        assert!(headers.contains(&("Accept".into(), "application/json".into())));
    }

    #[tokio::test]
    async fn test_api_key_stays_within_domain() {
        let inside = TableFetcher::new(&[]);
        ProbeEngine::new(inside.clone(), FetchLimits::probe(), Some("sk-test"))
            .with_key_domain("acme.example")
            .probe_candidate("https://developers.acme.example")
            .await;

        let headers = inside.seen_headers.lock().unwrap();
        assert!(headers.contains(&("Authorization".into(), "Bearer sk-test".into())));

        let outside = TableFetcher::new(&[]);
        ProbeEngine::new(outside.clone(), FetchLimits::probe(), Some("sk-test"))
            .with_key_domain("acme.example")
            .probe_candidate("https://api.github.com")
            .await;

        let headers = outside.seen_headers.lock().unwrap();
        assert!(!headers.is_empty());
        assert!(headers.iter().all(|(name, _)| name != "Authorization"));

        let lookalike = TableFetcher::new(&[]);
        ProbeEngine::new(lookalike.clone(), FetchLimits::probe(), Some("sk-test"))
            .with_key_domain("acme.example")
            .probe_candidate("https://notacme.example")
            .await;

        assert!(lookalike
            .seen_headers
            .lock()
            .unwrap()
            .iter()
            .all(|(name, _)| name != "Authorization"));
    }
}
