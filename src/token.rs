//! Registry pull token issuance
//!
//! A pull token is the complete `.dockerconfigjson` payload for the Falcon
//! container registry. [`FalconTokenIssuer`] obtains it from the Falcon API;
//! the reconciler only ever sees the [`TokenIssuer`] trait.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

#[cfg(test)]
use mockall::automock;

use crate::config::FalconApiConfig;
use crate::Error;

/// Timeout for every Falcon API request
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Opaque registry credential payload
///
/// The bytes are stored verbatim as the secret payload and wiped on drop.
pub struct PullToken(Zeroizing<Vec<u8>>);

impl PullToken {
    /// Wrap raw payload bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for PullToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PullToken(<{} bytes>)", self.0.len())
    }
}

/// Trait abstracting the service that issues registry pull tokens
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Fetch a fresh pull token
    async fn fetch_token(&self, api: &FalconApiConfig) -> Result<PullToken, Error>;
}

#[derive(Deserialize)]
struct OAuthToken {
    access_token: String,
}

#[derive(Deserialize)]
struct Resources<T> {
    #[serde(default = "Vec::new")]
    resources: Vec<T>,
}

#[derive(Deserialize)]
struct RegistryCredentials {
    token: String,
}

/// Token issuer backed by the Falcon API
pub struct FalconTokenIssuer {
    http: reqwest::Client,
    base_url: Option<String>,
}

impl FalconTokenIssuer {
    /// Create an issuer that talks to the API endpoint of each request's region
    pub fn new() -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http))
    }

    /// Create an issuer with a custom HTTP client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: None,
        }
    }

    /// Send every request to `base_url` instead of the regional endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    fn base<'a>(&'a self, api: &FalconApiConfig) -> &'a str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| api.region.api_base())
            .trim_end_matches('/')
    }

    async fn access_token(
        &self,
        base: &str,
        api: &FalconApiConfig,
    ) -> Result<Zeroizing<String>, Error> {
        let response = self
            .http
            .post(format!("{base}/oauth2/token"))
            .form(&[
                ("client_id", api.client_id.as_str()),
                ("client_secret", api.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::token_fetch(format!("oauth2 token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::token_fetch(format!(
                "oauth2 token request returned {status}"
            )));
        }

        let token: OAuthToken = response
            .json()
            .await
            .map_err(|e| Error::token_fetch(format!("invalid oauth2 token response: {e}")))?;
        Ok(Zeroizing::new(token.access_token))
    }

    async fn get_resources<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        bearer: &str,
        what: &str,
    ) -> Result<Vec<T>, Error> {
        let response = self
            .http
            .get(&url)
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|e| Error::token_fetch(format!("{what} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::token_fetch(format!("{what} request returned {status}")));
        }

        let body: Resources<T> = response
            .json()
            .await
            .map_err(|e| Error::token_fetch(format!("invalid {what} response: {e}")))?;
        Ok(body.resources)
    }

    async fn customer_id(
        &self,
        base: &str,
        bearer: &str,
        api: &FalconApiConfig,
    ) -> Result<String, Error> {
        if let Some(cid) = &api.cid {
            return Ok(cid.clone());
        }

        debug!("looking up customer ID");
        self.get_resources::<String>(
            format!("{base}/sensors/queries/installers/ccid/v1"),
            bearer,
            "customer ID",
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::token_fetch("customer ID response had no resources"))
    }
}

#[async_trait]
impl TokenIssuer for FalconTokenIssuer {
    async fn fetch_token(&self, api: &FalconApiConfig) -> Result<PullToken, Error> {
        let base = self.base(api);

        let bearer = self.access_token(base, api).await?;
        let cid = self.customer_id(base, &bearer, api).await?;

        let credentials = self
            .get_resources::<RegistryCredentials>(
                format!("{base}/container-security/entities/image-registry-credentials/v1"),
                &bearer,
                "registry credentials",
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::token_fetch("registry credentials response had no resources"))?;

        let registry = api.region.registry_host();
        let username = registry_username(&cid);
        let payload = docker_config_json(registry, &username, &credentials.token)?;

        info!(registry = %registry, region = %api.region, "fetched registry pull token");
        Ok(PullToken::new(payload))
    }
}

/// Registry username for a customer ID
///
/// The checksum suffix is dropped and the remainder lowercased:
/// `ABCDEF0123-4A` becomes `fc-abcdef0123`.
pub fn registry_username(cid: &str) -> String {
    let id = cid.split('-').next().unwrap_or(cid);
    format!("fc-{}", id.to_lowercase())
}

/// Render a `.dockerconfigjson` document with a single registry entry
pub fn docker_config_json(registry: &str, username: &str, token: &str) -> Result<Vec<u8>, Error> {
    let auth = STANDARD.encode(format!("{username}:{token}"));
    let doc = serde_json::json!({
        "auths": {
            registry: {
                "auth": auth
            }
        }
    });
    serde_json::to_vec(&doc)
        .map_err(|e| Error::serialization(format!("failed to render dockerconfigjson: {e}")))
}
