/* crates/herald-server/src/export.rs */

//! Static export: every prebuilt path of every cached template written as
//! `<out>/<path>/index.html`. Nothing in the output regenerates, so TTL
//! directives are dropped and dynamic templates are skipped.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::document::{render_not_found, render_page};
use crate::errors::HeraldError;
use crate::page::PageResult;
use crate::server::HeraldParts;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
  pub written: Vec<String>,
  /// Paths whose primary resource is missing; no file is written.
  pub not_found: Vec<String>,
  pub redirects: usize,
  /// Templates with no enumerable paths (dynamic, or on-demand only).
  pub skipped_routes: Vec<String>,
}

fn io_err(path: &Path, e: &std::io::Error) -> HeraldError {
  HeraldError::internal(format!("{}: {e}", path.display()))
}

/// `/` -> `<out>/index.html`, `/post/a` -> `<out>/post/a/index.html`.
pub fn output_path(out_dir: &Path, path: &str) -> PathBuf {
  let mut file = out_dir.to_path_buf();
  for seg in path.split('/').filter(|s| !s.is_empty() && *s != "." && *s != "..") {
    file.push(seg);
  }
  file.join("index.html")
}

pub async fn export_static(
  parts: &HeraldParts,
  out_dir: &Path,
) -> Result<ExportReport, HeraldError> {
  tokio::fs::create_dir_all(out_dir).await.map_err(|e| io_err(out_dir, &e))?;
  let mut report = ExportReport::default();
  let mut redirects = String::new();

  for rule in &parts.redirects {
    let code = if rule.permanent { 301 } else { 302 };
    let _ = writeln!(redirects, "{} {} {code}", rule.source(), rule.target());
    report.redirects += 1;
  }

  for page in &parts.pages {
    if page.template.revalidate.is_dynamic() {
      report.skipped_routes.push(page.template.name.clone());
      continue;
    }
    let paths = parts
      .prebuilt_paths(page)
      .await
      .map_err(|e| HeraldError::from(e).context(&page.template.name))?;
    if paths.is_empty() {
      tracing::debug!(route = %page.template.name, "no prebuilt paths; route not exported");
      report.skipped_routes.push(page.template.name.clone());
      continue;
    }

    for (path, raw) in paths {
      match parts.materializer.materialize(page, &raw, &HashMap::new()).await {
        PageResult::Ok { props, .. } => {
          let file = output_path(out_dir, &path);
          if let Some(dir) = file.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| io_err(dir, &e))?;
          }
          let html = render_page(page, &props, &path, &parts.config);
          tokio::fs::write(&file, html).await.map_err(|e| io_err(&file, &e))?;
          report.written.push(path);
        }
        PageResult::Redirect { target, permanent } => {
          let code = if permanent { 301 } else { 302 };
          let _ = writeln!(redirects, "{path} {target} {code}");
          report.redirects += 1;
        }
        PageResult::NotFound => report.not_found.push(path),
        PageResult::ServerError { .. } => {
          return Err(HeraldError::internal(format!("{path}: render failed during export")));
        }
      }
    }
  }

  let not_found = out_dir.join("404.html");
  tokio::fs::write(&not_found, render_not_found(&parts.config))
    .await
    .map_err(|e| io_err(&not_found, &e))?;
  if !redirects.is_empty() {
    let file = out_dir.join("_redirects");
    tokio::fs::write(&file, redirects).await.map_err(|e| io_err(&file, &e))?;
  }

  tracing::info!(
    written = report.written.len(),
    not_found = report.not_found.len(),
    redirects = report.redirects,
    "static export complete"
  );
  Ok(report)
}
