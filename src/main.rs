//! `rag-rs` binary entry point: installs a `tracing` subscriber, parses
//! CLI arguments, and dispatches to [`rag_rs::cli::execute`].

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use rag_rs::cli::Cli;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match rag_rs::cli::execute(&cli).await {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("{}", rag_rs::cli::render_error(&err));
            std::process::exit(1);
        }
    }
}
