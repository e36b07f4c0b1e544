mod cli;
mod documents;
mod esign;
mod infra;
mod requests;

use sigdoc::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
