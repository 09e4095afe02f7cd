pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use zipline_core::error::Result;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let global = cli.global;
    match cli.command {
        Commands::Pack { out, dir } => handlers::handle_pack(&global, out, dir).await,
        Commands::Fetch {
            out,
            base_url,
            root,
            token,
            share_token,
            share_password,
        } => {
            handlers::handle_fetch(&global, out, base_url, root, token, share_token, share_password)
                .await
        }
        Commands::List { archive } => handlers::handle_list(archive),
        Commands::Verify { archive } => handlers::handle_verify(archive),
        Commands::Extract { archive, dest } => handlers::handle_extract(archive, dest),
    }
}
