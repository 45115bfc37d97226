use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::config::HttpCfg;
use crate::error::{ChatError, CoreResult};

/// Request context carries the provider label and propagated trace headers.
#[derive(Clone, Copy, Default)]
pub struct RequestCtx<'a> {
    /// Provider label used in mapped errors (defaults to "http").
    pub provider: Option<&'a str>,
    /// W3C trace-context headers of the span the request belongs to.
    pub trace_headers: &'a [(String, String)],
}

impl RequestCtx<'_> {
    fn provider(&self) -> &str {
        self.provider.unwrap_or("http")
    }
}

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::new(&HttpCfg::default())
    }

    pub fn new(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(max_idle) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max_idle);
        }
        let inner = builder
            .build()
            .map_err(|e| ChatError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("threadtrace/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    /// POST a JSON body and decode a JSON reply.
    /// Returns the decoded body, the provider's request id (if any) and latency in ms.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
        ctx: &RequestCtx<'_>,
    ) -> CoreResult<(R, Option<String>, u32)> {
        let start = Instant::now();
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent);

        // custom headers
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        for (k, v) in ctx.trace_headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let resp = req.send().await.map_err(|e| {
            debug!(error = %e, url, "request failed before a response arrived");
            ChatError::ProviderUnavailable {
                provider: ctx.provider().to_string(),
            }
        })?;

        let latency = start.elapsed().as_millis() as u32;
        let status = resp.status();
        let headers = resp.headers().clone();
        let provider_request_id = extract_request_id(&headers);

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let ra = parse_retry_after(&headers);
            return Err(map_http_error(ctx.provider(), status, ra, &text));
        }

        let parsed = resp
            .json::<R>()
            .await
            .map_err(|e| ChatError::ProviderError {
                provider: ctx.provider().to_string(),
                code: status.as_u16().to_string(),
                message: format!("json decode error: {e}"),
            })?;
        Ok((parsed, provider_request_id, latency))
    }
}

fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    static CANDIDATES: [&str; 3] = ["request-id", "x-request-id", "x-amzn-requestid"];
    for k in CANDIDATES {
        if let Some(v) = headers.get(k)
            && let Ok(s) = v.to_str()
        {
            return Some(s.to_string());
        }
    }
    None
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored.
    None
}

fn map_http_error(provider: &str, status: StatusCode, retry_after: Option<u64>, body: &str) -> ChatError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        s if s.is_server_error() => ChatError::ProviderUnavailable {
            provider: provider.to_string(),
        },
        s => ChatError::ProviderError {
            provider: provider.to_string(),
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn post_json_success_forwards_trace_headers() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/chat")
                .header("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01");
            then.status(200)
                .header("request-id", "abc123")
                .json_body(json!({"ok": true}));
        });

        #[derive(serde::Deserialize)]
        struct Resp {
            ok: bool,
        }

        let client = HttpClient::new_default().unwrap();
        let trace_headers = vec![(
            "traceparent".to_string(),
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".to_string(),
        )];
        let ctx = RequestCtx {
            provider: Some("anthropic"),
            trace_headers: &trace_headers,
        };
        let (resp, provider_id, _latency) = client
            .post_json::<_, Resp>(
                &format!("{}/chat", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
                &ctx,
            )
            .await
            .unwrap();

        assert!(resp.ok);
        assert_eq!(provider_id, Some("abc123".into()));
        m.assert();
    }

    #[tokio::test]
    async fn post_json_429_maps_to_rate_limited() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(429).header("Retry-After", "7").body("slow down");
        });
        let client = HttpClient::new_default().expect("client");
        let ctx = RequestCtx {
            provider: Some("anthropic"),
            ..Default::default()
        };
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
                &ctx,
            )
            .await
            .unwrap_err();

        match err {
            ChatError::RateLimited {
                provider,
                retry_after,
            } => {
                assert_eq!(provider, "anthropic");
                assert_eq!(retry_after, Some(7));
            }
            other => panic!("expected RateLimited, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn post_json_503_maps_to_unavailable() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(503).body("oops");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
                &RequestCtx::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::ProviderUnavailable { .. }));
    }

    #[tokio::test]
    async fn post_json_200_bad_json_maps_to_provider_error() {
        let server = MockServer::start();
        let _m = server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(200).body("not-json");
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
                &RequestCtx::default(),
            )
            .await
            .unwrap_err();
        match err {
            ChatError::ProviderError { code, provider, .. } => {
                assert_eq!(code, "200");
                assert_eq!(provider, "http");
            }
            other => panic!("expected ProviderError, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn post_json_400_truncates_body() {
        let server = MockServer::start();
        let big = "x".repeat(1000);
        let _m = server.mock(|when, then| {
            when.method(POST).path("/chat");
            then.status(400).body(big.clone());
        });
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                &format!("{}/chat", server.base_url()),
                &json!({"msg":"hi"}),
                &[],
                &RequestCtx::default(),
            )
            .await
            .unwrap_err();
        match err {
            ChatError::ProviderError { message, code, .. } => {
                assert_eq!(code, "400");
                assert_eq!(message.len(), 303);
                assert!(message.ends_with("..."));
            }
            other => panic!("expected ProviderError, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn network_error_maps_to_unavailable() {
        // Port 9 (discard) is typically closed.
        let client = HttpClient::new_default().expect("client");
        let err = client
            .post_json::<_, serde_json::Value>(
                "http://127.0.0.1:9/chat",
                &json!({"msg":"hi"}),
                &[],
                &RequestCtx::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::ProviderUnavailable { .. }));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "é".repeat(200);
        let t = truncate(&s, 301);
        assert!(t.ends_with("..."));
        assert_eq!(t.len(), 300 + 3);
    }
}
