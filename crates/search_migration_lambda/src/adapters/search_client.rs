use std::time::{Duration, SystemTime};

use reqwest::blocking::{Client, Request};
use reqwest::Url;
use search_migration_core::endpoint::Endpoint;
use search_migration_core::error::TransportError;
use search_migration_core::transport::{Method, SearchRequest, SearchResponse, SearchTransport};

use super::signing::RequestSigner;

/// Blocking HTTP client for one search endpoint. Every request is signed
/// right before it is sent.
#[derive(Debug, Clone)]
pub struct SignedSearchClient {
    client: Client,
    endpoint: Endpoint,
    signer: RequestSigner,
}

impl SignedSearchClient {
    /// `timeout: None` leaves the request duration bounded only by the
    /// invocation timeout.
    pub fn new(
        endpoint: Endpoint,
        signer: RequestSigner,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Request(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            client,
            endpoint,
            signer,
        })
    }

    /// Build the outbound request, signature headers included.
    pub fn prepare(&self, request: &SearchRequest) -> Result<Request, TransportError> {
        self.prepare_at(request, SystemTime::now())
    }

    fn prepare_at(&self, request: &SearchRequest, time: SystemTime) -> Result<Request, TransportError> {
        let url = Url::parse(&self.endpoint.url_for(&request.path))
            .map_err(|error| TransportError::Request(format!("invalid request URL: {error}")))?;

        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("host"))
            .cloned()
            .collect();
        headers.push(("host".to_string(), self.endpoint.authority()));
        let has_content_type = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if request.body.is_some() && !has_content_type {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }

        let body = request.body.clone().unwrap_or_default();
        let signature_headers = self.signer.sign(
            request.method.as_str(),
            url.as_str(),
            &headers,
            body.as_bytes(),
            time,
        )?;

        let mut builder = self.client.request(http_method(request.method), url);
        for (name, value) in headers.iter().chain(signature_headers.iter()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.body.is_some() {
            builder = builder.body(body);
        }

        builder
            .build()
            .map_err(|error| TransportError::Request(error.to_string()))
    }
}

impl SearchTransport for SignedSearchClient {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn send(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError> {
        let prepared = self.prepare(request)?;
        let response = self
            .client
            .execute(prepared)
            .map_err(|error| TransportError::Http(error.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|error| TransportError::Http(format!("failed to read response body: {error}")))?;
        Ok(SearchResponse { status, body })
    }
}

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}
