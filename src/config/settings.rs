//! Configuration settings for CloudMove
//!
//! Defines the engine options, CLI arguments, and defaults for the
//! chunked transfer engine.

use crate::error::{CloudMoveError, IoResultExt, Result};
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default chunk size: 8 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Default number of leading bytes captured for content-type sniffing
pub const DEFAULT_LEADING_BYTES: usize = 512;

/// What to do when the destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum OverwritePolicy {
    /// Replace the existing item
    Always,
    /// Leave the existing item alone and report the transfer as skipped
    Skip,
    /// Treat an existing item as an error
    Fail,
}

/// Kind of remote service an endpoint talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum RemoteKind {
    /// Block-oriented object store (staged blocks, committed block list)
    ObjectStore,
    /// File share taking ranged writes against a pre-created file
    FileShare,
}

/// Engine configuration for transfer execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Chunk size in bytes
    pub chunk_size: u64,
    /// Worker threads per transfer (0 = one per CPU)
    pub workers: usize,
    /// Aggregate bandwidth cap as a rate string ("100M"); None = unlimited
    pub bandwidth: Option<String>,
    /// Leading bytes captured for content-type sniffing
    pub leading_bytes: usize,
    /// Default overwrite policy for new transfers
    pub overwrite: OverwritePolicy,
    /// Replay source metadata onto the destination after a successful
    /// transfer
    pub preserve_properties: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
            bandwidth: None,
            leading_bytes: DEFAULT_LEADING_BYTES,
            overwrite: OverwritePolicy::Always,
            preserve_properties: false,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(CloudMoveError::config("chunk size must be positive"));
        }
        if self.leading_bytes == 0 || self.leading_bytes > 1024 * 1024 {
            return Err(CloudMoveError::config(
                "leading bytes must be between 1 and 1 MiB",
            ));
        }
        if let Some(rate) = &self.bandwidth {
            if crate::pacer::Pacer::from_rate_string(rate).is_none() {
                return Err(CloudMoveError::config(format!(
                    "invalid bandwidth cap: {rate}"
                )));
            }
        }
        Ok(())
    }

    /// Worker count with the auto-detect default applied
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Build the engine configuration from parsed CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let config = Self {
            chunk_size: parse_size(&args.chunk_size)
                .ok_or_else(|| CloudMoveError::config(format!("invalid chunk size: {}", args.chunk_size)))?,
            workers: args.workers,
            bandwidth: args.bandwidth.clone(),
            leading_bytes: args.leading_bytes,
            overwrite: args.overwrite,
            preserve_properties: args.preserve,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| CloudMoveError::config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CloudMoveError::config(e.to_string()))?;
        std::fs::write(path, text).with_path(path)?;
        Ok(())
    }
}

/// Parse a human-readable size string ("8M", "64K", "1G", "4096")
pub fn parse_size(size: &str) -> Option<u64> {
    let size = size.trim().to_uppercase();

    let (num_str, multiplier) = if size.ends_with('G') || size.ends_with("GB") {
        (size.trim_end_matches("GB").trim_end_matches('G'), 1024 * 1024 * 1024)
    } else if size.ends_with('M') || size.ends_with("MB") {
        (size.trim_end_matches("MB").trim_end_matches('M'), 1024 * 1024)
    } else if size.ends_with('K') || size.ends_with("KB") {
        (size.trim_end_matches("KB").trim_end_matches('K'), 1024)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1)
    } else {
        (size.as_str(), 1)
    };

    let num: f64 = num_str.trim().parse().ok()?;
    if num <= 0.0 {
        return None;
    }
    Some((num * multiplier as f64) as u64)
}

/// CloudMove - chunked data-movement engine for cloud storage transfers
#[derive(Parser, Debug, Clone)]
#[command(name = "cloudmove")]
#[command(author = "CloudMove Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "High-throughput chunked file transfers with metadata replay")]
#[command(long_about = r#"
CloudMove moves single files in fixed-size chunks with bounded concurrency
and throttled bandwidth, then replays source metadata (timestamps,
attributes, access-control state) onto the destination once every chunk
has landed.

Examples:
  cloudmove report.pdf /mnt/backup                  # Upload one file
  cloudmove big.iso /mnt/backup -c 64M -w 8         # 64 MiB chunks, 8 workers
  cloudmove data.bin /mnt/backup --bandwidth 50M    # Cap at 50 MiB/s
  cloudmove notes.txt /mnt/backup -k file-share -p  # Preserve metadata
"#)]
pub struct CliArgs {
    /// Local source file to upload
    #[arg(value_name = "SOURCE")]
    pub source: Option<PathBuf>,

    /// Destination root directory acting as the remote service
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<PathBuf>,

    /// Name of the item at the destination (defaults to the source file name)
    #[arg(short = 'n', long, value_name = "NAME")]
    pub remote_name: Option<String>,

    /// Remote service kind to emulate
    #[arg(short = 'k', long, value_enum, default_value = "object-store")]
    pub kind: RemoteKind,

    /// Chunk size (e.g. 8M, 64K)
    #[arg(short = 'c', long, default_value = "8M", value_name = "SIZE")]
    pub chunk_size: String,

    /// Number of worker threads (0 = auto-detect)
    #[arg(short = 'w', long, default_value = "0", value_name = "NUM")]
    pub workers: usize,

    /// Aggregate bandwidth cap (e.g. 100M, 1G)
    #[arg(long, value_name = "RATE")]
    pub bandwidth: Option<String>,

    /// What to do when the destination already exists
    #[arg(long, value_enum, default_value = "always")]
    pub overwrite: OverwritePolicy,

    /// Replay source metadata onto the destination after the transfer
    #[arg(short = 'p', long)]
    pub preserve: bool,

    /// Leading bytes captured for content-type sniffing
    #[arg(long, default_value = "512", value_name = "NUM")]
    pub leading_bytes: usize,

    /// Suppress the summary output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Increase log verbosity
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}
