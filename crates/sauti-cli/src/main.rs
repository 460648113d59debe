//! Sauti CLI - chain and window-geometry diagnostics
//!
//! Examples:
//!   sauti chain                     # Print the full stage chain
//!   sauti geometry -w 100           # Print the window geometry
//!   sauti geometry -w 100 --json    # Same, machine-readable
//!   sauti plan -w 100 16000         # Fit a clip against the geometry

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use sauti_core::model::{decoder_chain, encoder_chain};
use sauti_core::{Autoencoder, AutoencoderConfig, Chain};

/// Sauti - speech autoencoder geometry diagnostics
#[derive(Parser)]
#[command(
    name = "sauti",
    about = "Speech autoencoder geometry diagnostics",
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Model configuration file (JSON); built-in defaults when omitted
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the stage chain for a model configuration
    Chain,

    /// Print the window geometry for a batch window size
    Geometry {
        /// Predictions per batch window
        #[arg(short, long, default_value = "100")]
        window: i64,

        /// Emit JSON instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Check how a clip length fits the window geometry
    Plan {
        /// Predictions per batch window
        #[arg(short, long, default_value = "100")]
        window: i64,

        /// Clip length in samples
        clip: i64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AutoencoderConfig> {
    match path {
        Some(path) => {
            let config = AutoencoderConfig::from_json_file(path)?;
            debug!(path = %path.display(), "loaded model configuration");
            Ok(config)
        }
        None => Ok(AutoencoderConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt::init();
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Chain => {
            let chain = Chain::join(
                encoder_chain(&config.mfcc, &config.encoder)?,
                decoder_chain(&config.decoder)?,
            )?;
            print!("{}", chain.dump());
        }

        Commands::Geometry { window, json } => {
            let model = Autoencoder::new(config, window)?;
            if json {
                println!("{}", serde_json::to_string_pretty(model.geometry())?);
            } else {
                println!("{}", model.geometry());
            }
        }

        Commands::Plan { window, clip } => {
            let model = Autoencoder::new(config, window)?;
            let geometry = model.geometry();
            let count = geometry.window_count(clip)?;
            println!(
                "clip of {clip} samples fits {count} window start(s) of {} samples each",
                geometry.input_samples
            );
        }
    }

    Ok(())
}
