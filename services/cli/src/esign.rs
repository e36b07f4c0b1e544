use crate::infra::JsonConnectionStore;
use chrono::Local;
use clap::Args;
use sigdoc::config::AppConfig;
use sigdoc::error::AppError;
use sigdoc::workflows::esign::{DocuSignClient, EsignGateway, EsignSession};
use sigdoc::workflows::requests::{ConnectionStore, RequestServiceError, UserId};

#[derive(Args, Debug, Default)]
pub(crate) struct UserArgs {
    /// Owner of the stored session
    #[arg(long, default_value = "system")]
    pub(crate) user: String,
}

impl UserArgs {
    pub(crate) fn user_id(&self) -> UserId {
        UserId(self.user.clone())
    }
}

#[derive(Args, Debug)]
pub(crate) struct AuthUrlArgs {
    /// Opaque value echoed back to the redirect URI
    #[arg(long)]
    pub(crate) state: Option<String>,
}

pub(crate) fn client(config: &AppConfig) -> Result<DocuSignClient, AppError> {
    let settings = config.esign.settings()?;
    Ok(DocuSignClient::new(settings)?)
}

pub(crate) fn run_auth_url(config: &AppConfig, args: AuthUrlArgs) -> Result<(), AppError> {
    let url = client(config)?.authorization_url(args.state.as_deref())?;
    println!("{url}");
    Ok(())
}

pub(crate) async fn run_auth_exchange(
    config: &AppConfig,
    code: String,
    user: UserArgs,
) -> Result<(), AppError> {
    let session = client(config)?.exchange_code(&code).await?;
    let store = JsonConnectionStore::new(config.documents.token_store.clone());
    store
        .save(&user.user_id(), session.clone())
        .map_err(RequestServiceError::from)?;
    print_session("Connected", &session);
    Ok(())
}

pub(crate) async fn run_auth_refresh(config: &AppConfig, user: UserArgs) -> Result<(), AppError> {
    let store = JsonConnectionStore::new(config.documents.token_store.clone());
    let user_id = user.user_id();
    let current = store
        .load(&user_id)
        .map_err(RequestServiceError::from)?
        .ok_or_else(|| RequestServiceError::NotConnected(user_id.clone()))?;
    let refresh_token = current
        .refresh_token
        .ok_or_else(|| RequestServiceError::SessionExpired(user_id.clone()))?;

    let session = client(config)?.refresh(&refresh_token).await?;
    store
        .save(&user_id, session.clone())
        .map_err(RequestServiceError::from)?;
    print_session("Refreshed", &session);
    Ok(())
}

fn print_session(verb: &str, session: &EsignSession) {
    println!("{verb} account {}", session.account_id);
    println!("- api: {}", session.account_api());
    println!(
        "- token expires: {}",
        session.expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
}
