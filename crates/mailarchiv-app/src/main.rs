// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mailarchiv — reference host.
//
// Entry point. Initialises logging, reads one message, runs the archiver, and
// writes the PDF, the JSON report and optionally the searchable text.

mod config;

use std::path::PathBuf;

use clap::Parser;
use mailarchiv_core::error::{ArchiveError, Result};
use mailarchiv_core::{BodyPreference, ConsumptionScope};
use mailarchiv_pipeline::Archiver;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "mailarchiv", version, about = "Archive an e-mail message as one PDF")]
struct Cli {
    /// Raw RFC 5322 message (.eml)
    #[arg(value_name = "MESSAGE")]
    message: PathBuf,

    /// Output PDF; defaults to the message path with a .pdf extension
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// JSON config file (policy, pipeline, backend)
    #[arg(short, long, value_name = "FILE", env = "MAILARCHIV_CONFIG")]
    config: Option<PathBuf>,

    /// Write the pipeline report as JSON here instead of stdout
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Write the searchable plain text here
    #[arg(long, value_name = "FILE")]
    text: Option<PathBuf>,

    /// Leave attachments out (overrides the config file)
    #[arg(long)]
    mail_only: bool,

    /// Prefer the html body (overrides the config file)
    #[arg(long)]
    prefer_html: bool,

    /// Normalise to PDF/A (overrides the config file)
    #[arg(long)]
    pdfa: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(message = %cli.message.display(), "Mailarchiv starting");

    let mut app_config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if cli.mail_only {
        app_config.policy.scope = ConsumptionScope::MailOnly;
    }
    if cli.prefer_html {
        app_config.policy.body_preference = BodyPreference::PreferHtml;
    }
    if cli.pdfa {
        app_config.policy.produce_archival_profile = true;
    }

    let archiver = Archiver::new(app_config.pipeline.clone(), app_config.collaborators()?)?;
    let raw = tokio::fs::read(&cli.message).await?;

    let output = tokio::select! {
        result = archiver.archive(&raw, app_config.policy) => result?,
        _ = tokio::signal::ctrl_c() => return Err(ArchiveError::Cancelled),
    };

    let pdf_path = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.message.with_extension("pdf"));
    tokio::fs::write(&pdf_path, &output.document.pdf).await?;

    if let Some(path) = &cli.text {
        tokio::fs::write(path, output.text.as_bytes()).await?;
    }

    let report = serde_json::to_string_pretty(&output.report)?;
    match &cli.report {
        Some(path) => tokio::fs::write(path, report).await?,
        None => println!("{report}"),
    }

    if output.report.is_degraded() {
        for warning in &output.report.warnings {
            tracing::warn!(%warning, "degraded output");
        }
        tracing::warn!(
            failed = output.report.failed,
            warnings = output.report.warnings.len(),
            "archive is incomplete, see the report"
        );
    }
    tracing::info!(
        path = %pdf_path.display(),
        pages = output.report.page_count,
        "archive written"
    );
    Ok(())
}
