/* demo/classifieds/src/main.rs */

mod routes;
mod sample;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herald_server::{Gateway, HeraldConfig, HeraldServer, HttpGateway, export_static};
use herald_server_axum::IntoAxumRouter;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

use routes::SiteRoutes;

/// Resource kind -> API path, for the HTTP gateway.
const ENDPOINTS: &[(&str, &str)] = &[
  ("seo", "/seo/{page}"),
  ("categories", "/categories"),
  ("latest_posts", "/posts/latest"),
  ("posts", "/posts"),
  ("category_seo", "/categories/{category}/seo"),
  ("category_posts", "/categories/{category}/posts"),
  ("post", "/posts/{slug}"),
  ("related_posts", "/posts/{slug}/related"),
  ("partners", "/partners"),
  ("partner", "/partners/{partner}"),
  ("blogs", "/blogs"),
  ("blog", "/blogs/{slug}"),
  ("search", "/search"),
  ("banner", "/banners"),
];

#[derive(Parser)]
#[command(name = "classifieds", about = "Classifieds site served by Herald")]
struct Cli {
  /// Route files directory
  #[arg(long, default_value = "routes")]
  routes: PathBuf,
  /// Static assets served under /static
  #[arg(long, default_value = "public")]
  public: PathBuf,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Prerender known paths, then serve with on-demand regeneration
  Serve {
    /// Skip the prerender pass; every page builds on first request
    #[arg(long)]
    no_prerender: bool,
  },
  /// Write a fully static site to OUT
  Export { out: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let mut config = HeraldConfig::from_env()?;
  let site = SiteRoutes::load(&cli.routes)?;
  if site.invalidation.is_none() && config.revalidate_secret.take().is_some() {
    tracing::warn!(
      "{} has no api/revalidate.toml; on-demand invalidation disabled",
      cli.routes.display()
    );
  }
  let gateway = gateway(&config)?;

  match cli.command {
    Command::Serve { no_prerender } => {
      let addr = config.bind_addr();
      let parts = site.apply(HeraldServer::new(gateway).config(config)).into_parts();
      if !no_prerender {
        parts.prerender().await;
      }
      let router = parts
        .into_axum_router()
        .route_service("/robots.txt", ServeFile::new(cli.public.join("robots.txt")))
        .nest_service("/static", ServeDir::new(&cli.public));

      let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
      tracing::info!("classifieds running on http://{addr}");
      axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;
    }
    Command::Export { out } => {
      config.export_mode = true;
      let parts = site.apply(HeraldServer::new(gateway).config(config)).into_parts();
      let report = export_static(&parts, &out).await?;
      copy_dir(&cli.public, &out.join("static"))?;
      if cli.public.join("robots.txt").is_file() {
        std::fs::copy(cli.public.join("robots.txt"), out.join("robots.txt"))?;
      }
      tracing::info!(
        pages = report.written.len(),
        skipped = ?report.skipped_routes,
        out = %out.display(),
        "export written"
      );
    }
  }
  Ok(())
}

/// The HTTP gateway when `API_URL` is set, otherwise the bundled sample data.
fn gateway(config: &HeraldConfig) -> Result<Arc<dyn Gateway>> {
  let Some(api_url) = &config.api_url else {
    tracing::warn!("API_URL not set; serving the bundled sample data");
    return Ok(Arc::new(sample::sample_gateway()));
  };
  let mut http = HttpGateway::new(api_url.clone(), config.api_timeout)?;
  for (kind, path) in ENDPOINTS {
    http = http.endpoint(*kind, *path);
  }
  Ok(Arc::new(http))
}

fn copy_dir(from: &Path, to: &Path) -> Result<()> {
  if !from.is_dir() {
    return Ok(());
  }
  std::fs::create_dir_all(to).with_context(|| format!("failed to create {}", to.display()))?;
  for entry in std::fs::read_dir(from)? {
    let path = entry?.path();
    let Some(name) = path.file_name() else { continue };
    if path.is_dir() {
      copy_dir(&path, &to.join(name))?;
    } else {
      std::fs::copy(&path, to.join(name))
        .with_context(|| format!("failed to copy {}", path.display()))?;
    }
  }
  Ok(())
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_err() {
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}
