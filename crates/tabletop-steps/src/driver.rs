//! The HTTP driver port and its reqwest implementation.
//!
//! The step definitions issue requests through this trait only, so a
//! suite can point them at a live service or stub the responses
//! entirely (see the `the next HTTP response is` step).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::str::FromStr;

/// One request as the HTTP steps assemble it.
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// One response as the assertion steps consume it.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self {
            status,
            headers,
            body: body.to_string().into_bytes(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.headers
            .get("content-type")
            .is_some_and(|value| value.starts_with("application/json"))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn parsed(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[async_trait]
pub trait HttpDriver: Send + Sync {
    async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse>;
}

/// Drives a live HTTP service through reqwest.
pub struct ReqwestDriver {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestDriver {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpDriver for ReqwestDriver {
    async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse> {
        let method = reqwest::Method::from_str(&request.method.to_uppercase())?;
        let url = format!("{}{}", self.base_url, request.url);
        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
