//! reqwest implementation of [`ApiRepository`].

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::discovery::{common_spec_urls, extract_spec_url_from_html, looks_like_html};
use super::parser::parse_spec;
use super::{ApiEndpoint, ApiRepository, ApiRequest, ApiResponse};
use crate::auth::Headers;
use crate::{QueryBridgeError, Result};

/// HTTP-backed API repository
#[derive(Debug, Clone)]
pub struct HttpApiRepository {
    client: Client,
    request_timeout: Duration,
    probe_timeout: Duration,
}

/// What came back from a spec URL
enum SpecFetch {
    Document(Value),
    Html(String),
    Unusable,
}

impl HttpApiRepository {
    pub fn new(request_timeout: Duration, probe_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            request_timeout,
            probe_timeout,
        }
    }

    fn with_headers(builder: RequestBuilder, headers: &Headers) -> RequestBuilder {
        headers
            .iter()
            .fold(builder, |builder, (name, value)| builder.header(name.as_str(), value.as_str()))
    }

    async fn fetch(&self, url: &str, headers: &Headers, timeout: Duration) -> Result<SpecFetch> {
        let response = Self::with_headers(self.client.get(url), headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| QueryBridgeError::Discovery(format!("GET {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryBridgeError::Discovery(format!(
                "GET {} returned HTTP {}",
                url, status
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response
            .text()
            .await
            .map_err(|e| QueryBridgeError::Discovery(format!("Failed to read {}: {}", url, e)))?;

        // Some servers send JSON with the wrong content type
        if let Ok(document @ Value::Object(_)) = serde_json::from_str::<Value>(&body) {
            return Ok(SpecFetch::Document(document));
        }
        if looks_like_html(&content_type, &body) {
            return Ok(SpecFetch::Html(body));
        }
        Ok(SpecFetch::Unusable)
    }

    /// Direct document, then Swagger UI page, then conventional paths
    async fn fetch_spec(&self, url: &str, headers: &Headers) -> Result<Value> {
        match self.fetch(url, headers, self.request_timeout).await {
            Ok(SpecFetch::Document(document)) => return Ok(document),
            Ok(SpecFetch::Html(html)) => {
                if let Some(spec_url) = extract_spec_url_from_html(&html, url) {
                    debug!(page = url, spec = %spec_url, "following Swagger UI spec url");
                    match self.fetch(&spec_url, headers, self.request_timeout).await {
                        Ok(SpecFetch::Document(document)) => return Ok(document),
                        Ok(_) => warn!(spec = %spec_url, "embedded spec url did not return JSON"),
                        Err(e) => warn!(spec = %spec_url, error = %e, "embedded spec url failed"),
                    }
                }
            }
            Ok(SpecFetch::Unusable) => {}
            Err(e) => warn!(url, error = %e, "spec fetch failed, probing common paths"),
        }

        for candidate in common_spec_urls(url)? {
            if let Ok(SpecFetch::Document(document)) =
                self.fetch(&candidate, headers, self.probe_timeout).await
            {
                info!(spec = %candidate, "found spec at conventional path");
                return Ok(document);
            }
        }

        Err(QueryBridgeError::Discovery(format!(
            "No se pudo encontrar el spec OpenAPI/Swagger en {}. \
             Intenta proporcionar la URL directa al archivo .json del spec.",
            url
        )))
    }
}

impl Default for HttpApiRepository {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(10))
    }
}

#[async_trait]
impl ApiRepository for HttpApiRepository {
    async fn discover_endpoints(&self, url: &str, headers: &Headers) -> Result<Vec<ApiEndpoint>> {
        let spec = self.fetch_spec(url, headers).await?;
        let endpoints = parse_spec(&spec, url)?;
        info!(url, endpoint_count = endpoints.len(), "endpoints discovered");
        Ok(endpoints)
    }

    async fn execute_request(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = request.resolved_url();
        debug!(method = %request.method, url = %url, "executing API request");

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .query(&request.params)
            .timeout(self.request_timeout);
        builder = Self::with_headers(builder, &request.headers);
        if let Some(json) = &request.json {
            builder = builder.json(json);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "API request failed");
                return Ok(ApiResponse::failed(0, e.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(ApiResponse::failed(
                status.as_u16(),
                format!("HTTP {} for url: {}", status, url),
            ));
        }

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Ok(ApiResponse::failed(status.as_u16(), e.to_string())),
        };
        let data = match serde_json::from_str::<Value>(&text) {
            Ok(data) => data,
            Err(_) => serde_json::json!({ "raw_text": text }),
        };

        Ok(ApiResponse::ok(status.as_u16(), headers, data))
    }
}
