use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(name = "filesync")]
#[clap(about = "Manage your stored files", long_about = None)]
pub struct Cli {
    /// Config file, defaults to the platform config folder
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user instead of the configured owner
    #[clap(long, global = true)]
    pub owner: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List files, newest first
    List,

    /// Upload local files
    Upload {
        #[clap(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Save a stored file into a folder
    Download {
        /// Id or name of the stored file
        file: String,

        #[clap(long)]
        to: Option<PathBuf>,
    },

    /// Print a stored text file
    Cat { file: String },

    /// Replace the content of a stored text file
    Edit {
        file: String,

        /// Read the new content from this file instead of stdin
        #[clap(long)]
        from: Option<PathBuf>,
    },

    Delete { file: String },

    /// Look for blobs and records left behind by failed operations
    Reconcile {
        #[clap(long)]
        purge: bool,
    },
}
