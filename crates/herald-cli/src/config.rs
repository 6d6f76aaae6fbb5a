/* crates/herald-cli/src/config.rs */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "herald.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeraldToml {
  #[serde(default)]
  pub export: ExportSection,
  #[serde(default)]
  pub revalidate: RevalidateSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSection {
  /// Route tree scanned for revalidation directives.
  pub routes_dir: String,
  /// Route files that need a live server, relative to `routes_dir`.
  pub exclude: Vec<String>,
  /// Regex matching one directive, including its trailing newline.
  pub directive: String,
  /// File extensions considered route files.
  pub extensions: Vec<String>,
  pub staging_dir: String,
  pub build_command: String,
}

impl Default for ExportSection {
  fn default() -> Self {
    Self {
      routes_dir: "routes".into(),
      exclude: vec!["api/revalidate.toml".into(), "sitemap.toml".into(), "redirects.toml".into()],
      directive: r"(?m)^[ \t]*revalidate[ \t]*[:=][^\n]*\n?".into(),
      extensions: vec!["toml".into()],
      staging_dir: ".herald/staging".into(),
      build_command: "cargo run --release -- export out".into(),
    }
  }
}

impl ExportSection {
  pub fn validate(&self) -> Result<()> {
    if self.build_command.trim().is_empty() {
      bail!("export.build_command must not be empty");
    }
    if self.extensions.is_empty() {
      bail!("export.extensions must list at least one extension");
    }
    Regex::new(&self.directive)
      .with_context(|| format!("export.directive is not a valid regex: {}", self.directive))?;
    for path in &self.exclude {
      if Path::new(path).is_absolute() || path.split('/').any(|seg| seg == "..") {
        bail!("export.exclude entry \"{path}\" must stay inside routes_dir");
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RevalidateSection {
  /// Base URL of the running server.
  pub url: String,
  pub timeout_secs: u64,
}

impl Default for RevalidateSection {
  fn default() -> Self {
    Self { url: "http://localhost:3000".into(), timeout_secs: 10 }
  }
}

/// Walk upward from `start` looking for `herald.toml`, like cargo does for
/// `Cargo.toml`.
pub fn find_config(start: &Path) -> Option<PathBuf> {
  start.ancestors().map(|dir| dir.join(CONFIG_FILE)).find(|candidate| candidate.is_file())
}

pub fn load_config(path: &Path) -> Result<HeraldToml> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  let config: HeraldToml =
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))?;
  config.export.validate()?;
  Ok(config)
}

/// The explicit `--config` path, else the nearest `herald.toml`, else
/// defaults rooted at `cwd`. Returns the config and its base directory.
pub fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<(HeraldToml, PathBuf)> {
  let path = match explicit {
    Some(path) => Some(path.to_path_buf()),
    None => find_config(cwd),
  };
  match path {
    Some(path) => {
      let config = load_config(&path)?;
      let base = path.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
      Ok((config, base))
    }
    None => {
      tracing::debug!("no {CONFIG_FILE} found; using defaults");
      Ok((HeraldToml::default(), cwd.to_path_buf()))
    }
  }
}
