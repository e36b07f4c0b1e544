use crate::esign::{client, UserArgs};
use crate::infra::{InMemoryRequestRepository, JsonConnectionStore};
use clap::Args;
use sigdoc::config::AppConfig;
use sigdoc::error::AppError;
use sigdoc::workflows::documents::TemplateCatalog;
use sigdoc::workflows::requests::{RequestSubmission, SigningRequestService};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct RequestSubmitArgs {
    /// JSON file shaped like the intake form body
    pub(crate) submission: PathBuf,
    #[command(flatten)]
    pub(crate) user: UserArgs,
    /// Validate and store the request without generating or publishing it
    #[arg(long)]
    pub(crate) dry_run: bool,
}

pub(crate) async fn run_request_submit(
    config: &AppConfig,
    args: RequestSubmitArgs,
) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.submission)?;
    let submission: RequestSubmission = serde_json::from_str(&raw)?;

    let service = SigningRequestService::new(
        Arc::new(InMemoryRequestRepository::default()),
        Arc::new(JsonConnectionStore::new(
            config.documents.token_store.clone(),
        )),
        Arc::new(client(config)?),
        Arc::new(TemplateCatalog::standard()),
        &config.documents,
    );

    let request = service.submit(args.user.user_id(), submission)?;
    println!("Accepted request {}", request.id);
    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&request.status_view())?);
        return Ok(());
    }

    let outcome = service.process(&request.id).await;
    let stored = service.get(&request.id)?;
    println!("{}", serde_json::to_string_pretty(&stored.status_view())?);
    outcome?;
    Ok(())
}
