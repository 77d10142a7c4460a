use std::fmt;

use url::Url;

use crate::error::ConfigurationError;

/// Target search cluster, e.g. `https://search-example.us-east-2.es.amazonaws.com`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    /// `None` for the scheme's default port.
    port: Option<u16>,
}

impl Endpoint {
    /// Parse an endpoint URL. A bare host (as emitted by CloudFormation domain
    /// outputs) is treated as `https://<host>`.
    pub fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        let trimmed = raw.trim();
        let invalid = |reason: String| ConfigurationError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(ConfigurationError::MissingEndpoint);
        }

        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        let url = Url::parse(&candidate).map_err(|error| invalid(error.to_string()))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid("scheme must be http or https".to_string()));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("endpoint must be an absolute URL".to_string()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("endpoint must not carry user info".to_string()));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("endpoint must not carry a path or query".to_string()));
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("host cannot be empty".to_string()))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Value of the `host` header, including a non-default port.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{port}", self.host),
            None => self.host.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }

    /// Absolute URL for a request path such as `/opensearch_changelog/_search`.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url())
        } else {
            format!("{}/{path}", self.base_url())
        }
    }

    /// Region embedded in managed-domain host names
    /// (`<domain>.<region>.es.amazonaws.com`, `<id>.<region>.aoss.amazonaws.com`).
    pub fn inferred_region(&self) -> Option<&str> {
        let labels: Vec<&str> = self.host.split('.').collect();
        if labels.len() < 5 || !self.host.ends_with(".amazonaws.com") {
            return None;
        }
        let service = labels[labels.len() - 3];
        if service != "es" && service != "aoss" {
            return None;
        }
        Some(labels[labels.len() - 4])
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}
