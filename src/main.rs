mod config;
mod edit;
mod errors;
mod logging;
mod mcp;
mod range;
mod sandbox;
mod security;
mod server;
mod tools;

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::sandbox::AllowedRoots;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Sandboxed text-editing tool server.
#[derive(Parser, Debug)]
#[command(name = "rangefs")]
#[command(about = "Serves marker-based file editing tools confined to allowed directories")]
struct Args {
    /// Config file (TOML, or JSON by extension)
    #[arg(long, default_value = "rangefs.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty_logs: bool,

    /// Additional allowed directories
    #[arg(value_name = "DIR")]
    allowed_dirs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.pretty_logs);

    let cfg = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?
        .with_extra_dirs(args.allowed_dirs);
    cfg.validate().context("validating config")?;

    let roots = AllowedRoots::new(&cfg.sandbox.allowed_dirs).context("resolving allowed directories")?;
    let allowed: Vec<String> = roots.paths().map(|p| p.display().to_string()).collect();
    let registry = mcp::registry::ToolRegistry::new(Arc::new(roots));

    let addr = format!("{}:{}", cfg.server.bind_addr, cfg.server.port);
    info!(addr = %addr, base_path = %cfg.server.base_path, allowed = ?allowed, tools = ?registry.list_names(), "rangefs ready");

    server::serve(cfg, registry).await
}
