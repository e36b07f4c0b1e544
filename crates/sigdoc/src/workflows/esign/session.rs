use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before the platform says so.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// OAuth application registration with the e-signature platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsignSettings {
    pub integration_key: String,
    pub secret_key: Option<String>,
    pub redirect_uri: String,
    /// Host of the OAuth server, e.g. `account-d.docusign.com`. A full
    /// `http(s)://` origin is accepted as well.
    pub auth_server: String,
    /// REST base used when an account does not report its own base URI.
    pub base_path: String,
}

impl EsignSettings {
    pub fn auth_origin(&self) -> String {
        let server = self.auth_server.trim_end_matches('/');
        if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("https://{server}")
        }
    }
}

/// An authorized connection to one platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsignSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub account_id: String,
    /// Account origin as reported by the user-info endpoint.
    pub base_uri: String,
}

impl EsignSession {
    pub fn expiring_in(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        account_id: String,
        base_uri: String,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
            account_id,
            base_uri,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECONDS) >= self.expires_at
    }

    /// Versioned REST root for this account, e.g.
    /// `https://demo.docusign.net/restapi/v2.1/accounts/{id}`.
    pub fn account_api(&self) -> String {
        let base = self.base_uri.trim_end_matches('/');
        let base = base.strip_suffix("/restapi").unwrap_or(base);
        format!("{base}/restapi/v2.1/accounts/{}", self.account_id)
    }
}
