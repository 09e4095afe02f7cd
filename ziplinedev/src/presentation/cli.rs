use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "zipline dev CLI: stream folder trees into ZIP archives", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug, Default)]
pub struct GlobalArgs {
    /// JSON file with scheduling policy (memory_budget, max_chunk_items, page sizes)
    #[arg(long, global = true)]
    pub policy: Option<PathBuf>,

    /// Bytes that one download chunk may buffer at once
    #[arg(long, global = true)]
    pub memory_budget: Option<u64>,

    /// Files fetched concurrently per chunk
    #[arg(long, global = true)]
    pub max_chunk_items: Option<usize>,

    /// Archive comment stored in the end record
    #[arg(long, global = true)]
    pub comment: Option<String>,

    /// Hide the progress spinner
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a local directory into a ZIP archive (`-` writes to stdout)
    Pack { out: String, dir: PathBuf },

    /// Stream a remote drive folder into a ZIP archive (`-` writes to stdout)
    Fetch {
        out: String,

        /// API root, e.g. https://drive.example.com/api/v1
        #[arg(long)]
        base_url: String,

        /// Folder id to archive
        #[arg(long)]
        root: String,

        /// Session token (sent as a bearer token)
        #[arg(long, conflicts_with = "share_token")]
        token: Option<String>,

        /// Shared-link token
        #[arg(long)]
        share_token: Option<String>,

        /// Password of a protected shared link
        #[arg(long, requires = "share_token")]
        share_password: Option<String>,
    },

    /// List archive contents
    List { archive: PathBuf },

    /// Check every entry's CRC-32 and size
    Verify { archive: PathBuf },

    /// Extract archive to destination
    Extract { archive: PathBuf, dest: PathBuf },
}
