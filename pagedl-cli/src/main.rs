mod cli;
mod config;
mod danmaku;
mod error;
mod input;
mod manifest;
mod prompt;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use crossterm::{cursor, execute};
use pagedl_engine::download::build_client;
use pagedl_engine::{
    DownloadEngine, MuxOrchestrator, MuxerSet, PageRunner, PageState, RunReport, Session,
};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;
use crate::config::AppConfig;
use crate::danmaku::ExternalConverter;
use crate::error::{AppError, Result, error_chain};
use crate::input::resolve_item_id;
use crate::manifest::Manifest;
use crate::prompt::StdinPrompt;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = init_logging(args.debug, args.quiet) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            restore_terminal();
            process::exit(130);
        }
    });

    let debug = args.debug;
    if let Err(e) = run(args).await {
        error!("{e}");
        if debug {
            for cause in error_chain(&e).iter().skip(1) {
                error!("  caused by: {cause}");
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    debug!(?config, "Effective configuration");

    let item_id = resolve_item_id(&args.input)?;
    info!(item = %item_id, "Resolved input");

    let pipeline = Arc::new(config.pipeline);
    let client = build_client(&pipeline.download)?;
    let manifest_path = config
        .manifest
        .clone()
        .unwrap_or_else(|| PathBuf::from("manifest.json"));
    let manifest = Arc::new(Manifest::load(&manifest_path, client).await?);

    let downloads = DownloadEngine::new(Arc::new(pipeline.download.clone()))?;
    let muxers = MuxerSet::from_config(&pipeline.mux);
    let mut runner = PageRunner::new(
        pipeline.clone(),
        downloads,
        MuxOrchestrator::new(muxers),
        manifest.clone(),
    )
    .with_subtitles(manifest.clone());
    if pipeline.selection.interactive {
        runner = runner.with_prompt(Arc::new(StdinPrompt));
    }
    if let Some(converter) = config.danmaku_converter {
        runner = runner.with_danmaku(Arc::new(ExternalConverter::new(converter)));
    }

    let session = Session::new(manifest, runner);
    let report = session.run(&item_id, &args.pages).await?;
    summarize(&report);
    Ok(())
}

fn summarize(report: &RunReport) {
    for output in &report.outputs {
        info!(path = %output.display(), "Saved");
    }
    for (page, exit) in &report.early_exits {
        debug!(page, ?exit, "Page ended early");
    }
    for (page, state, error) in &report.failures {
        let hint = match state {
            PageState::Muxing => " (downloaded files were kept)",
            _ => "",
        };
        warn!("P{page} failed while {state}: {error}{hint}");
    }
}

fn init_logging(debug: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(debug)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| AppError::Config(format!("cannot initialise logging: {e}")))
}

/// Bring back the cursor and terminal echo after an interrupt.
fn restore_terminal() {
    let _ = execute!(std::io::stdout(), cursor::Show);
    #[cfg(unix)]
    {
        let _ = process_utils::std_command("stty").arg("echo").status();
    }
}
