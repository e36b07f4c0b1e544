use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use super::envelope::EnvelopeTemplate;
use super::session::{EsignSession, EsignSettings};

const OAUTH_SCOPES: &str = "signature impersonation";
const DEFAULT_EXPIRES_IN: i64 = 3600;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum EsignError {
    #[error("request to e-signature platform failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed with HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("{operation} response had no {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
    #[error("no e-signature account is available for this login")]
    NoAccount,
    #[error("invalid platform URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Outbound operations the request pipeline needs from the platform.
#[async_trait]
pub trait EsignGateway: Send + Sync {
    /// Registers the envelope template, returning the platform's template id.
    async fn create_template(
        &self,
        session: &EsignSession,
        template: &EnvelopeTemplate,
    ) -> Result<String, EsignError>;

    async fn refresh(&self, refresh_token: &str) -> Result<EsignSession, EsignError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    accounts: Vec<UserAccount>,
}

#[derive(Debug, Deserialize)]
struct UserAccount {
    account_id: String,
    #[serde(default)]
    is_default: serde_json::Value,
    #[serde(default)]
    base_uri: Option<String>,
}

impl UserAccount {
    fn is_default(&self) -> bool {
        match &self.is_default {
            serde_json::Value::Bool(flag) => *flag,
            serde_json::Value::String(raw) => raw.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateTemplateResponse {
    #[serde(rename = "templateId", default)]
    template_id: Option<String>,
}

/// DocuSign authorization-code client plus the template endpoint.
#[derive(Debug, Clone)]
pub struct DocuSignClient {
    http: Client,
    settings: EsignSettings,
}

impl DocuSignClient {
    pub fn new(settings: EsignSettings) -> Result<Self, EsignError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("sigdoc/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, settings })
    }

    /// Consent URL the user visits to grant access.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<Url, EsignError> {
        let mut params = vec![
            ("response_type", "code"),
            ("scope", OAUTH_SCOPES),
            ("client_id", self.settings.integration_key.as_str()),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        if let Some(state) = state {
            params.push(("state", state));
        }
        let endpoint = format!("{}/oauth/auth", self.settings.auth_origin());
        Ok(Url::parse_with_params(&endpoint, &params)?)
    }

    /// Trades the callback's authorization code for a session.
    pub async fn exchange_code(&self, code: &str) -> Result<EsignSession, EsignError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
        ];
        let session = self.request_token("token exchange", &form, None).await?;
        info!(account_id = %session.account_id, "e-signature account connected");
        Ok(session)
    }

    async fn request_token(
        &self,
        operation: &'static str,
        form: &[(&str, &str)],
        previous_refresh: Option<&str>,
    ) -> Result<EsignSession, EsignError> {
        let response = self
            .http
            .post(format!("{}/oauth/token", self.settings.auth_origin()))
            .basic_auth(
                &self.settings.integration_key,
                self.settings.secret_key.as_deref(),
            )
            .form(form)
            .send()
            .await?;
        let token: TokenResponse = read_json(operation, response).await?;

        let access_token = token
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(EsignError::MissingField {
                operation,
                field: "access_token",
            })?;
        let (account_id, base_uri) = self.account_info(&access_token).await?;

        Ok(EsignSession::expiring_in(
            access_token,
            token
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
            account_id,
            base_uri,
        ))
    }

    /// Picks the default account, falling back to the first one listed.
    async fn account_info(&self, access_token: &str) -> Result<(String, String), EsignError> {
        let response = self
            .http
            .get(format!("{}/oauth/userinfo", self.settings.auth_origin()))
            .bearer_auth(access_token)
            .send()
            .await?;
        let user_info: UserInfoResponse = read_json("user info lookup", response).await?;

        let mut accounts = user_info.accounts;
        let index = accounts
            .iter()
            .position(UserAccount::is_default)
            .unwrap_or(0);
        if accounts.is_empty() {
            return Err(EsignError::NoAccount);
        }
        let account = accounts.swap_remove(index);
        let base_uri = account
            .base_uri
            .filter(|uri| !uri.trim().is_empty())
            .unwrap_or_else(|| self.settings.base_path.clone());

        debug!(account_id = %account.account_id, %base_uri, "resolved e-signature account");
        Ok((account.account_id, base_uri))
    }
}

#[async_trait]
impl EsignGateway for DocuSignClient {
    async fn create_template(
        &self,
        session: &EsignSession,
        template: &EnvelopeTemplate,
    ) -> Result<String, EsignError> {
        let response = self
            .http
            .post(format!("{}/templates", session.account_api()))
            .bearer_auth(&session.access_token)
            .json(template)
            .send()
            .await?;
        let created: CreateTemplateResponse = read_json("template creation", response).await?;

        created
            .template_id
            .filter(|id| !id.is_empty())
            .ok_or(EsignError::MissingField {
                operation: "template creation",
                field: "templateId",
            })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<EsignSession, EsignError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.request_token("token refresh", &form, Some(refresh_token))
            .await
    }
}

async fn read_json<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, EsignError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EsignError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}
