use crate::documents::{
    run_fill, run_header_check, run_merge, run_template_list, run_template_show, FillArgs,
    HeaderCheckArgs, MergeArgs, TemplateShowArgs,
};
use crate::esign::{run_auth_exchange, run_auth_refresh, run_auth_url, AuthUrlArgs, UserArgs};
use crate::requests::{run_request_submit, RequestSubmitArgs};
use clap::{Parser, Subcommand};
use sigdoc::config::AppConfig;
use sigdoc::error::AppError;
use sigdoc::telemetry;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "sigdoc",
    about = "Fill document templates, add the company header, and publish e-signature templates",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect the document template catalog
    Templates {
        #[command(subcommand)]
        command: TemplatesCommand,
    },
    /// Fill a catalog template and write the resulting PDF
    Fill(FillArgs),
    /// Put the header page in front of an existing PDF
    Merge(MergeArgs),
    /// Header PDF checks
    Header {
        #[command(subcommand)]
        command: HeaderCommand,
    },
    /// Connect an e-signature account
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Signing requests
    Request {
        #[command(subcommand)]
        command: RequestCommand,
    },
}

#[derive(Subcommand, Debug)]
enum TemplatesCommand {
    /// List active templates
    List,
    /// Show fields, anchors, and default signers of one template
    Show(TemplateShowArgs),
}

#[derive(Subcommand, Debug)]
enum HeaderCommand {
    /// Verify the configured header PDF is usable
    Check(HeaderCheckArgs),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Print the consent URL to open in a browser
    Url(AuthUrlArgs),
    /// Exchange the callback code and store the session
    Exchange(ExchangeArgs),
    /// Refresh the stored session
    Refresh(UserArgs),
}

#[derive(clap::Args, Debug)]
pub(crate) struct ExchangeArgs {
    /// Authorization code from the OAuth callback
    pub(crate) code: String,
    #[command(flatten)]
    pub(crate) user: UserArgs,
}

#[derive(Subcommand, Debug)]
enum RequestCommand {
    /// Submit a request from a JSON file and process it
    Submit(RequestSubmitArgs),
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    debug!(environment = ?config.environment, "configuration loaded");

    match cli.command {
        Command::Templates {
            command: TemplatesCommand::List,
        } => run_template_list(),
        Command::Templates {
            command: TemplatesCommand::Show(args),
        } => run_template_show(args),
        Command::Fill(args) => run_fill(&config, args),
        Command::Merge(args) => run_merge(&config, args),
        Command::Header {
            command: HeaderCommand::Check(args),
        } => run_header_check(&config, args),
        Command::Auth {
            command: AuthCommand::Url(args),
        } => run_auth_url(&config, args),
        Command::Auth {
            command: AuthCommand::Exchange(args),
        } => run_auth_exchange(&config, args.code, args.user).await,
        Command::Auth {
            command: AuthCommand::Refresh(args),
        } => run_auth_refresh(&config, args).await,
        Command::Request {
            command: RequestCommand::Submit(args),
        } => run_request_submit(&config, args).await,
    }
}
