use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skinscan")]
#[command(
    about = "Analyze skin photos against the detection service and manage scan history",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze a skin photo
    Analyze {
        /// Path to a jpg, jpeg or png image
        #[arg(required = true)]
        image: PathBuf,

        /// Save a detected condition to history
        #[arg(short, long)]
        save: bool,
    },

    /// Work with saved scans
    History {
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// List the conditions the service can detect
    Classes,

    /// Check the analysis service
    Health,
}

#[derive(Subcommand)]
pub enum HistoryCommand {
    /// Show saved scans
    List,

    /// Follow the history as other devices change it
    Watch,

    /// Delete one saved scan
    Delete {
        /// Id of the scan to delete
        #[arg(required = true)]
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
