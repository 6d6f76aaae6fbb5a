/* crates/herald-cli/src/main.rs */

mod config;
mod export;
mod revalidate;
mod shell;
mod ui;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use herald_server::HeraldConfig;
use herald_server::config::is_truthy;
use tracing_subscriber::EnvFilter;

use crate::config::{HeraldToml, resolve_config};
use crate::export::{ExportPlan, Interrupted, recover, run_export_pass};
use crate::revalidate::{RevalidateArgs, run_revalidate};

#[derive(Parser)]
#[command(name = "herald", about = "Herald static generation and revalidation CLI", version)]
struct Cli {
  /// Path to herald.toml (default: nearest one upward from the current dir)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run the build command; runs the export pass when NEXT_EXPORT is set
  Build,
  /// Run the build command as a fully static export
  Export,
  /// Restore route files left relocated or patched by a killed export
  Recover,
  /// Mark pages stale on a running server
  Revalidate {
    /// Server base URL (default: [revalidate] url in herald.toml)
    #[arg(long)]
    url: Option<String>,
    /// Shared secret (default: REVALIDATE_SECRET)
    #[arg(long)]
    secret: Option<String>,
    /// Path segment(s) of the page to refresh, e.g. `new-york/dating`
    #[arg(long)]
    site_url: Option<String>,
    /// Post slug to refresh
    #[arg(long)]
    slug: Option<String>,
  },
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_target(false)
    .init();

  if let Err(e) = run(Cli::parse()).await {
    ui::error(&format!("{e:#}"));
    let code = if e.downcast_ref::<Interrupted>().is_some() { 130 } else { 1 };
    std::process::exit(code);
  }
}

async fn run(cli: Cli) -> Result<()> {
  let cwd = std::env::current_dir().context("failed to read current directory")?;
  let (config, base_dir) = resolve_config(cli.config.as_deref(), &cwd)?;

  match cli.command {
    Command::Build => {
      let export = std::env::var("NEXT_EXPORT").is_ok_and(|v| is_truthy(&v));
      run_build(&config, &base_dir, export).await
    }
    Command::Export => run_build(&config, &base_dir, true).await,
    Command::Recover => {
      let staging = base_dir.join(&config.export.staging_dir);
      match recover(&staging)? {
        Some(report) => ui::ok(&format!(
          "restored {} relocated and {} patched file(s)",
          report.relocated, report.patched
        )),
        None => ui::ok("nothing to recover"),
      }
      Ok(())
    }
    Command::Revalidate { url, secret, site_url, slug } => {
      let env = HeraldConfig::from_env()?;
      let Some(secret) = secret.or(env.revalidate_secret) else {
        bail!("no secret given; pass --secret or set REVALIDATE_SECRET");
      };
      let args = RevalidateArgs {
        server: url.unwrap_or_else(|| config.revalidate.url.clone()),
        secret,
        site_url,
        slug,
        timeout: Duration::from_secs(config.revalidate.timeout_secs),
      };
      run_revalidate(&args).await.map(drop)
    }
  }
}

async fn run_build(config: &HeraldToml, base_dir: &Path, export: bool) -> Result<()> {
  let command = config.export.build_command.as_str();
  if !export {
    ui::arrow("building");
    shell::run_command(base_dir, command, "build", &[]).await?;
    ui::ok("build complete");
    return Ok(());
  }

  ui::arrow("exporting static site");
  let plan = ExportPlan::from_config(&config.export, base_dir)?;
  let summary = run_export_pass(&plan, || {
    shell::run_command(base_dir, command, "build", &[("NEXT_EXPORT", "1")])
  })
  .await?;
  ui::ok(&format!(
    "export complete ({} route(s) excluded, {} directive(s) stripped, all restored)",
    summary.relocated, summary.patched
  ));
  Ok(())
}
