mod application;
mod presentation {
    pub mod cli;
}

use tracing_subscriber::EnvFilter;
use zipline_core::error::Result;

const CANCELLED_EXIT: i32 = 130;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ZIPLINE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout may carry the archive
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    match application::run().await {
        Err(e) if e.is_cancelled() => {
            eprintln!("{e}");
            std::process::exit(CANCELLED_EXIT);
        }
        other => other,
    }
}
