//! Blocking HTTP transport shared by the catalog, inventory, and media-index clients. The clients
//! talk to an `HttpClient` so that their lookup logic runs against canned responses in tests.
use crate::error::{AutotagExpectedError, Result};
use reqwest::blocking::Client;
use reqwest::Url;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Canonical reason phrase for the status, e.g. `404 Not Found`.
    pub fn status_text(&self) -> String {
        match reqwest::StatusCode::from_u16(self.status) {
            Ok(code) => code.to_string(),
            Err(_) => self.status.to_string(),
        }
    }
}

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse>;
    fn put(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse>;
}

pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| AutotagExpectedError::Http {
            url: String::new(),
            reason: format!("failed to build HTTP client: {e}"),
        })?;
        Ok(Self { client })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut req = req;
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let resp = req.send().map_err(|e| AutotagExpectedError::Http {
            url: redact(url),
            reason: e.to_string(),
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| AutotagExpectedError::Http {
            url: redact(url),
            reason: format!("failed to read response body: {e}"),
        })?;
        debug!(url = %redact(url), status, bytes = body.len(), "HTTP response");
        Ok(HttpResponse { status, body })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(self.client.get(url.clone()), url, headers)
    }

    fn put(&self, url: &Url, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(self.client.put(url.clone()), url, headers)
    }
}

/// Render a URL for logs and errors with credential-like query values masked.
pub fn redact(url: &Url) -> String {
    let mut out = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let masked = k.to_lowercase().contains("token") || k.to_lowercase().contains("key");
            (k.into_owned(), if masked { "***".to_string() } else { v.into_owned() })
        })
        .collect();
    if pairs.is_empty() {
        return out.to_string();
    }
    out.query_pairs_mut().clear().extend_pairs(pairs);
    out.to_string()
}

pub fn parse_url(s: &str) -> Result<Url> {
    Url::parse(s).map_err(|e| {
        AutotagExpectedError::Http {
            url: s.to_string(),
            reason: format!("invalid URL: {e}"),
        }
        .into()
    })
}
