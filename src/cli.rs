//! Command line interface for the Voxgate binary

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Speaker verification against enrolled voiceprints
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Keep config, data and cache under this directory instead of the OS locations
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enroll (or re-enroll) an identity from an audio file
    Enroll(AudioArgs),

    /// Verify an audio file against an enrolled identity
    Verify {
        #[command(flatten)]
        audio: AudioArgs,

        /// Match threshold (defaults to the configured verify_threshold)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Remove an enrolled identity
    Remove {
        #[arg(short, long)]
        uid: String,
    },

    /// List enrolled identities
    List,

    /// Liveness check
    Health,
}

#[derive(Args, Debug)]
pub struct AudioArgs {
    /// Identity key
    #[arg(short, long)]
    pub uid: String,

    /// Audio file (WAV, FLAC, OGG, ... or anything the transcoder accepts)
    #[arg(short, long)]
    pub audio: PathBuf,

    /// Container hint; defaults to the file extension
    #[arg(short, long)]
    pub format: Option<String>,
}

impl AudioArgs {
    pub fn format_hint(&self) -> Option<String> {
        self.format.clone().or_else(|| {
            self.audio
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_string())
        })
    }
}
