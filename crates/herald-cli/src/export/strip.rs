/* crates/herald-cli/src/export/strip.rs */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;

/// Removes revalidation directives from route files. Nothing regenerates in a
/// static export, so a route that still declares a TTL fails the build.
pub struct DirectiveStripper {
  pattern: Regex,
}

impl DirectiveStripper {
  pub fn new(pattern: &str) -> Result<Self> {
    let pattern =
      Regex::new(pattern).with_context(|| format!("invalid directive pattern: {pattern}"))?;
    Ok(Self { pattern })
  }

  /// `content` with every directive removed, or `None` when it has none.
  pub fn strip(&self, content: &str) -> Option<String> {
    if !self.pattern.is_match(content) {
      return None;
    }
    Some(self.pattern.replace_all(content, "").into_owned())
  }
}

/// Route files under `dir` whose extension is listed, sorted by path.
/// `skip` (the staging area) is never descended into.
pub fn route_files(dir: &Path, extensions: &[String], skip: &Path) -> Result<Vec<PathBuf>> {
  let mut files = Vec::new();
  let mut pending = vec![dir.to_path_buf()];
  while let Some(current) = pending.pop() {
    let entries =
      std::fs::read_dir(&current).with_context(|| format!("failed to read {}", current.display()))?;
    for entry in entries {
      let entry = entry.with_context(|| format!("failed to read {}", current.display()))?;
      let path = entry.path();
      let file_type = entry.file_type()?;
      if file_type.is_dir() {
        if path != skip {
          pending.push(path);
        }
      } else if file_type.is_file() && has_extension(&path, extensions) {
        files.push(path);
      }
    }
  }
  files.sort();
  Ok(files)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| extensions.iter().any(|wanted| wanted.trim_start_matches('.') == ext))
}
