//! CloudMove CLI - chunked file transfer driver
//!
//! Thin driver over the transfer engine: uploads one file into a
//! directory-backed remote service with chunking, pacing, and optional
//! metadata replay.

use clap::Parser;
use cloudmove::config::{CliArgs, EngineConfig};
use cloudmove::error::{CloudMoveError, Result};
use cloudmove::properties::{LocalFileSource, PropertySource, SourceInfoProvider};
use cloudmove::transfer::{TransferInfo, TransferRunner};
use cloudmove::transport::LocalDirTransport;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let (Some(source), Some(destination)) = (args.source.clone(), args.destination.clone())
    else {
        eprintln!("Usage: cloudmove <SOURCE> <DESTINATION> [OPTIONS]");
        eprintln!("       cloudmove --help for more information");
        std::process::exit(1);
    };

    let config = EngineConfig::from_cli(&args)?;

    let metadata = std::fs::metadata(&source).map_err(|e| CloudMoveError::io(&source, e))?;
    if !metadata.is_file() {
        return Err(CloudMoveError::config(format!(
            "source is not a regular file: {}",
            source.display()
        )));
    }

    let remote_name = args.remote_name.clone().unwrap_or_else(|| {
        source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string())
    });

    let info = TransferInfo {
        id: 1,
        source: source.to_string_lossy().to_string(),
        destination: remote_name,
        size: metadata.len(),
        chunk_size: config.chunk_size,
        overwrite: config.overwrite,
    };

    if args.verbose > 0 {
        tracing::info!(
            source = %info.source,
            destination = %info.destination,
            size = info.size,
            chunk_size = info.chunk_size,
            workers = config.effective_workers(),
            "starting transfer"
        );
    }

    // Property capability is resolved once, up front.
    let properties: Option<Arc<dyn PropertySource>> = if config.preserve_properties {
        LocalFileSource::new(&source).properties()
    } else {
        None
    };

    let transport = Arc::new(LocalDirTransport::new(&destination)?);
    let runner = TransferRunner::new(config)?;

    let report = runner.upload(info, args.kind, transport, properties)?;

    if !args.quiet {
        report.print_summary();
    }

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
