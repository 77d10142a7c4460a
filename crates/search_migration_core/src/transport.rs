//! The seam between migration sessions and the (signed) HTTP client.

use crate::endpoint::Endpoint;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "HEAD" => Some(Self::Head),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub method: Method,
    /// Path plus optional query, relative to the endpoint root.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl SearchRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_json_body(mut self, body: &serde_json::Value) -> Self {
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        self.body = Some(body.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub status: u16,
    pub body: String,
}

impl SearchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait SearchTransport {
    fn endpoint(&self) -> &Endpoint;

    fn send(&self, request: &SearchRequest) -> Result<SearchResponse, TransportError>;
}
