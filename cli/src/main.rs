//! `super-lazy-clangd` entry point. stdin/stdout carry the protocol, so all
//! logging goes to stderr or the configured log file.

use clap::Parser;
use slclangd_core::paths::normalize_cli_path;
use slclangd_core::Server;
use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// super-lazy-clangd (tiny LSP, grep-backed)
#[derive(Debug, Parser)]
#[command(name = "super-lazy-clangd", version)]
struct Cli {
    /// Restrict search to this explicit list of files.
    #[arg(long = "files", value_name = "FILE", num_args = 1..)]
    files: Vec<PathBuf>,

    /// Write server logs/trace to this file (useful for editor debugging).
    /// When unset, the CLANGD_TRACE environment variable is consulted as a
    /// fallback path.
    #[arg(long = "log-file", value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false);
    match log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    }) {
        Some(file) => builder.with_writer(Arc::new(file)).init(),
        None => builder.with_writer(std::io::stderr).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_file = cli.log_file.clone().or_else(|| {
        // The vscode-clangd extension sets CLANGD_TRACE (clangd.trace) to a
        // file path; reuse it as the log sink to make debugging easy.
        std::env::var("CLANGD_TRACE")
            .ok()
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });
    init_logging(log_file.as_deref());

    let files: Vec<String> = cli
        .files
        .iter()
        .map(|path| normalize_cli_path(path).to_string_lossy().into_owned())
        .collect();

    tracing::info!("super-lazy-clangd starting on stdio");
    let server = Server::new(tokio::io::stdin(), tokio::io::stdout(), files);
    let shutdown_received = server.run().await;
    std::process::exit(if shutdown_received { 0 } else { 1 });
}
