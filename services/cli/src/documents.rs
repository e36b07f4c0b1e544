use crate::infra::parse_assignment;
use clap::Args;
use sigdoc::config::AppConfig;
use sigdoc::error::AppError;
use sigdoc::workflows::documents::pdf::{self, HeaderDocument};
use sigdoc::workflows::documents::{TemplateCatalog, TemplateId};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub(crate) struct TemplateShowArgs {
    /// Template id, e.g. lor-1
    pub(crate) id: String,
    /// Print the template as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct FillArgs {
    /// Template id, e.g. cvl-1
    pub(crate) template: String,
    /// Placeholder value as NAME=VALUE; repeat for each field
    #[arg(long = "value", short = 'v', value_parser = parse_assignment)]
    pub(crate) values: Vec<(String, String)>,
    /// Where to write the PDF
    #[arg(long, short = 'o')]
    pub(crate) output: PathBuf,
    /// Skip the header page
    #[arg(long)]
    pub(crate) no_header: bool,
}

#[derive(Args, Debug)]
pub(crate) struct MergeArgs {
    /// PDF to put behind the header page
    pub(crate) document: PathBuf,
    /// Where to write the merged PDF
    #[arg(long, short = 'o')]
    pub(crate) output: PathBuf,
    /// Compact the result for upload to the e-signature platform
    #[arg(long)]
    pub(crate) esign_friendly: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct HeaderCheckArgs {
    /// Check this file instead of the configured header
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
}

pub(crate) fn run_template_list() -> Result<(), AppError> {
    let catalog = TemplateCatalog::standard();
    println!("Document templates");
    for template in catalog.active() {
        println!(
            "- {} | {} ({}) | {} fields, {} signature anchors",
            template.id,
            template.name,
            template.category,
            template.placeholders.len(),
            template.anchors.len()
        );
    }
    Ok(())
}

pub(crate) fn run_template_show(args: TemplateShowArgs) -> Result<(), AppError> {
    let catalog = TemplateCatalog::standard();
    let template = catalog.active_template(&TemplateId(args.id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(template)?);
        return Ok(());
    }

    println!("{} - {} ({})", template.id, template.name, template.category);
    println!("Fields:");
    for field in &template.placeholders {
        println!(
            "  - {} [{}{}] {}",
            field.name,
            field.kind.label(),
            if field.required { ", required" } else { "" },
            field.label
        );
    }
    println!("Signature anchors:");
    for anchor in &template.anchors {
        println!(
            "  - {} [{}] {}",
            anchor.name,
            anchor.tab_type.label(),
            anchor.label
        );
    }
    println!("Default signers:");
    for role in &template.default_roles {
        let tabs: Vec<&str> = template
            .default_tab_map
            .iter()
            .filter(|mapping| mapping.role_name == role.role_name)
            .map(|mapping| mapping.anchor_name.as_str())
            .collect();
        println!(
            "  {}. {} -> {}",
            role.signing_order,
            role.role_name,
            tabs.join(", ")
        );
    }
    Ok(())
}

pub(crate) fn run_fill(config: &AppConfig, args: FillArgs) -> Result<(), AppError> {
    let catalog = TemplateCatalog::standard();
    let template = catalog.active_template(&TemplateId(args.template))?;
    let values: BTreeMap<String, String> = args.values.into_iter().collect();

    let filled = template.fill(&values)?;
    if !filled.unfilled.is_empty() {
        warn!(fields = %filled.unfilled.join(","), "optional fields left unfilled");
    }

    let mut output = pdf::render_text_document(&template.name, &filled.text)?;
    if !args.no_header {
        let header = HeaderDocument::load(&config.documents.header_pdf)?;
        header.ensure_no_anchors()?;
        output = pdf::merge_header(&header, &output)?;
    }

    std::fs::write(&args.output, &output)?;
    info!(template = %template.id, path = %args.output.display(), "filled document written");
    println!(
        "Wrote {} ({} pages)",
        args.output.display(),
        pdf::page_count(&output)?
    );
    Ok(())
}

pub(crate) fn run_merge(config: &AppConfig, args: MergeArgs) -> Result<(), AppError> {
    let header = HeaderDocument::load(&config.documents.header_pdf)?;
    header.ensure_no_anchors()?;

    let document = std::fs::read(&args.document)?;
    let mut merged = pdf::merge_header(&header, &document)?;
    if args.esign_friendly {
        merged = pdf::optimize_for_esign(&merged)?;
    }

    std::fs::write(&args.output, &merged)?;
    println!(
        "Wrote {} ({} pages, {} bytes)",
        args.output.display(),
        pdf::page_count(&merged)?,
        merged.len()
    );
    Ok(())
}

pub(crate) fn run_header_check(config: &AppConfig, args: HeaderCheckArgs) -> Result<(), AppError> {
    let path = args
        .path
        .unwrap_or_else(|| config.documents.header_pdf.clone());
    let header = HeaderDocument::load(&path)?;
    header.ensure_no_anchors()?;

    println!("Header {} is usable", header.path().display());
    println!("- pages: {}", pdf::page_count(header.bytes())?);
    println!("- sha256: {}", header.fingerprint());
    Ok(())
}
