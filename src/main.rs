use clap::Parser;
use tracing::{debug, error};

use cqstats::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    debug!("cqstats started with verbosity level: {}", cli.verbose);

    if let Err(e) = cli::run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
