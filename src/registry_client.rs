use crate::errors::AppError;
use crate::models::IdentificationType;
use serde_json::Value;
use std::time::Duration;

/// Requests to the registry give up after this long.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry path segment for a kind of identification.
pub fn registry_path(kind: IdentificationType) -> &'static str {
    match kind {
        IdentificationType::Ruc => "ruc",
        _ => "cedula",
    }
}

/// Client for the external tax-registry lookup API.
#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: url::Url,
    api_key: String,
}

impl RegistryClient {
    /// Creates a new `RegistryClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The registry base URL (`API_URL`).
    /// * `api_key` - The bearer key (`API_KEY`).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create registry client: {}", e)))?;

        let base_url = url::Url::parse(&base_url.into())
            .map_err(|e| AppError::Internal(format!("Invalid registry URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Internal(format!(
                "Registry URL cannot carry a path: {}",
                base_url
            )));
        }

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    /// `{base}/{cedula|ruc}/{identification}`, with the identification
    /// percent-encoded as a single path segment.
    pub fn lookup_url(
        &self,
        kind: IdentificationType,
        identification: &str,
    ) -> Result<url::Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("Registry URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(registry_path(kind))
            .push(identification);
        Ok(url)
    }

    /// Fetches the registry document for an identification.
    ///
    /// # Arguments
    ///
    /// * `kind` - `Ruc` queries `/ruc/{id}`, anything else `/cedula/{id}`.
    /// * `identification` - The already-validated identification number.
    ///
    /// # Returns
    ///
    /// * `Result<Value, AppError>` - The document as received. Connection
    ///   failures and timeouts are `RegistryUnavailable`, non-200 answers are
    ///   `RegistryError`, bodies that are not JSON are `MalformedResponse`.
    pub async fn lookup(
        &self,
        kind: IdentificationType,
        identification: &str,
    ) -> Result<Value, AppError> {
        let url = self.lookup_url(kind, identification)?;
        tracing::info!("Querying registry: {}", url);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| AppError::RegistryUnavailable(format!("registry request failed: {}", e)))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::warn!("Registry returned {} for {}", status, identification);
            return Err(AppError::RegistryError {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::RegistryUnavailable(format!("reading registry body: {}", e)))?;

        serde_json::from_slice(&bytes).map_err(|e| {
            AppError::MalformedResponse(format!("registry body is not JSON: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identification_stays_one_path_segment() {
        let client = RegistryClient::new("http://registry.local/api/", "key").unwrap();
        let url = client
            .lookup_url(IdentificationType::NationalId, "ab/../x?q=")
            .unwrap();
        assert_eq!(url.query(), None);
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments, ["api", "cedula", "ab%2F..%2Fx%3Fq="]);
    }

    #[test]
    fn builds_paths_per_kind() {
        let client = RegistryClient::new("http://registry.local", "key").unwrap();
        assert_eq!(
            client
                .lookup_url(IdentificationType::Ruc, "1790012345001")
                .unwrap()
                .as_str(),
            "http://registry.local/ruc/1790012345001"
        );
        assert!(RegistryClient::new("not a url", "key").is_err());
    }
}
