//! slmgate entry point: logging up, CLI dispatched, exit code out.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use slmgate::cli::{self, Cli};

#[tokio::main]
async fn main() {
    // Logs go to stderr so --json output on stdout stays one clean object.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERROR: {err:#}");
            1
        }
    };
    std::process::exit(code);
}
