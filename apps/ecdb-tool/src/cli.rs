use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a level file and print its schema and row counts without creating a world
    Inspect {
        /// Path to the level file
        path: PathBuf,
    },

    /// Load a level into a fresh world, run a fixed number of frames, and optionally
    /// write the resulting state back out
    Run {
        /// Path to the level file to preload
        #[arg(short, long)]
        level: PathBuf,

        /// Number of frames to run
        #[arg(short, long, default_value_t = 60)]
        frames: u32,

        /// Path to write the post-run level to
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}
