//! Connection details for a single PVE cluster node.

use crate::core::domain::error::EndpointError;
use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION, COOKIE};
use std::fmt;
use url::Url;

/// Credential used to authenticate against the PVE API.
///
/// PVE accepts either a long-lived API token (sent as an `Authorization`
/// header) or a session ticket (sent as a `PVEAuthCookie` cookie).
#[derive(Clone, PartialEq, Eq)]
pub enum PveCredential {
    /// An API token, e.g. id `automation@pve!inventory` plus its secret.
    ApiToken { token_id: String, secret: String },
    /// A session ticket obtained from `/access/ticket`.
    Ticket(String),
}

impl PveCredential {
    pub fn api_token(token_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::ApiToken {
            token_id: token_id.into(),
            secret: secret.into(),
        }
    }

    pub fn ticket(ticket: impl Into<String>) -> Self {
        Self::Ticket(ticket.into())
    }

    /// Renders the credential as the header PVE expects.
    fn header(&self) -> Result<(HeaderName, HeaderValue), EndpointError> {
        let (name, rendered) = match self {
            Self::ApiToken { token_id, secret } => {
                (AUTHORIZATION, format!("PVEAPIToken={token_id}={secret}"))
            }
            Self::Ticket(ticket) => (COOKIE, format!("PVEAuthCookie={ticket}")),
        };
        let mut value = HeaderValue::from_str(&rendered)
            .map_err(|_| EndpointError::CredentialNotHeaderSafe)?;
        value.set_sensitive(true);
        Ok((name, value))
    }
}

impl fmt::Debug for PveCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiToken { token_id, .. } => f
                .debug_struct("ApiToken")
                .field("token_id", token_id)
                .field("secret", &"<redacted>")
                .finish(),
            Self::Ticket(_) => f.debug_tuple("Ticket").field(&"<redacted>").finish(),
        }
    }
}

/// Immutable connection target for one orchestration run: cluster base URI,
/// node identifier and authentication credential.
///
/// Supplied per call by whichever collaborator owns configuration; nothing in
/// this crate persists it.
#[derive(Debug, Clone)]
pub struct PveEndpoint {
    base_url: Url,
    node: String,
    auth_header: (HeaderName, HeaderValue),
}

impl PveEndpoint {
    /// Builds an endpoint, validating up front that the credential can be
    /// carried in an HTTP header.
    pub fn new(
        base_url: Url,
        node: impl Into<String>,
        credential: PveCredential,
    ) -> Result<Self, EndpointError> {
        let auth_header = credential.header()?;
        Ok(Self {
            base_url,
            node: node.into(),
            auth_header,
        })
    }

    /// The node identifier used in API paths.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// The pre-rendered authentication header for this endpoint.
    pub(crate) fn auth_header(&self) -> (HeaderName, HeaderValue) {
        self.auth_header.clone()
    }

    /// Builds a full `/api2/json` URL for the given path.
    pub fn api_url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{}/api2/json/{}", base, path.trim_start_matches('/'))
    }
}
