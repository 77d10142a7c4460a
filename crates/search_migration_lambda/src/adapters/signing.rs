//! SigV4 request signing for OpenSearch / Elasticsearch domains.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use search_migration_core::error::TransportError;

/// Signs requests for one service/region with fixed credentials.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    service: String,
    region: String,
    credentials: Credentials,
}

impl RequestSigner {
    pub fn new(
        service: impl Into<String>,
        region: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            service: service.into(),
            region: region.into(),
            credentials,
        }
    }

    /// Compute the headers (`authorization`, `x-amz-date`, and
    /// `x-amz-security-token` for session credentials) to add to a request.
    ///
    /// `headers` must contain every header that will be sent, `host` included.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: &[u8],
        time: SystemTime,
    ) -> Result<Vec<(String, String)>, TransportError> {
        let identity: Identity = self.credentials.clone().into();
        let v4_params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(time)
            .settings(SigningSettings::default())
            .build()
            .map_err(|error| TransportError::Signing(error.to_string()))?;
        let params: SigningParams<'_> = v4_params.into();

        let signable = SignableRequest::new(
            method,
            url,
            headers
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
            SignableBody::Bytes(body),
        )
        .map_err(|error| TransportError::Signing(error.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|error| TransportError::Signing(error.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}
