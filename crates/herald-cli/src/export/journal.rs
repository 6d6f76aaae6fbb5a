/* crates/herald-cli/src/export/journal.rs */

//! Undo log for the exclusion pass. Each change to the route tree is written
//! to `<staging>/journal.json` before it is made, so a run killed part way
//! through can be undone by the next one.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const JOURNAL_FILE: &str = "journal.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Relocation {
  original: PathBuf,
  staged: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Patch {
  path: PathBuf,
  /// Original bytes, copied before the file was rewritten.
  backup: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Entries {
  relocated: Vec<Relocation>,
  patched: Vec<Patch>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
  pub relocated: usize,
  pub patched: usize,
}

pub struct ExportJournal {
  staging: PathBuf,
  entries: Entries,
  finished: bool,
}

impl ExportJournal {
  /// Start an empty journal. Refuses to overwrite one left by another run.
  pub fn begin(staging: &Path) -> Result<Self> {
    let file = staging.join(JOURNAL_FILE);
    if file.exists() {
      bail!("{} already exists; run `herald recover` first", file.display());
    }
    std::fs::create_dir_all(staging)
      .with_context(|| format!("failed to create {}", staging.display()))?;
    let journal =
      Self { staging: staging.to_path_buf(), entries: Entries::default(), finished: false };
    journal.persist()?;
    Ok(journal)
  }

  /// Load the journal a previous run left behind, if any.
  pub fn open(staging: &Path) -> Result<Option<Self>> {
    let file = staging.join(JOURNAL_FILE);
    if !file.exists() {
      return Ok(None);
    }
    let content = std::fs::read_to_string(&file)
      .with_context(|| format!("failed to read {}", file.display()))?;
    let entries: Entries = serde_json::from_str(&content)
      .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(Some(Self { staging: staging.to_path_buf(), entries, finished: false }))
  }

  pub fn relocated(&self) -> usize {
    self.entries.relocated.len()
  }

  pub fn patched(&self) -> usize {
    self.entries.patched.len()
  }

  /// Move `path` into staging. An absent file is skipped and returns `false`.
  pub fn relocate(&mut self, path: &Path) -> Result<bool> {
    if !path.is_file() {
      tracing::debug!(path = %path.display(), "exclusion target absent; skipped");
      return Ok(false);
    }
    let staged = self.slot("relocated", self.entries.relocated.len(), path)?;
    self
      .entries
      .relocated
      .push(Relocation { original: path.to_path_buf(), staged: staged.clone() });
    self.persist()?;
    move_file(path, &staged)
      .with_context(|| format!("failed to move {} to {}", path.display(), staged.display()))?;
    Ok(true)
  }

  /// Back up `path`, then overwrite it with `content`.
  pub fn patch(&mut self, path: &Path, content: &str) -> Result<()> {
    let backup = self.slot("patched", self.entries.patched.len(), path)?;
    std::fs::copy(path, &backup)
      .with_context(|| format!("failed to back up {}", path.display()))?;
    self.entries.patched.push(Patch { path: path.to_path_buf(), backup });
    self.persist()?;
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
  }

  /// Undo every change, newest first. Every entry is attempted even when an
  /// earlier one fails; failed entries stay journaled for `herald recover`.
  /// A fully restored journal removes the staging directory.
  pub fn restore(&mut self) -> Result<RestoreReport> {
    self.finished = true;
    let mut report = RestoreReport::default();
    let mut kept = Entries::default();
    let mut failures = Vec::new();

    for patch in std::mem::take(&mut self.entries.patched).into_iter().rev() {
      // Killed before the backup was taken: the file was never rewritten.
      if !patch.backup.exists() {
        continue;
      }
      match std::fs::copy(&patch.backup, &patch.path) {
        Ok(_) => report.patched += 1,
        Err(e) => {
          tracing::error!(
            path = %patch.path.display(),
            error = %e,
            "failed to restore patched file"
          );
          failures.push(format!("{}: {e}", patch.path.display()));
          kept.patched.push(patch);
        }
      }
    }

    for reloc in std::mem::take(&mut self.entries.relocated).into_iter().rev() {
      if !reloc.staged.exists() {
        continue;
      }
      let moved = reloc
        .original
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| move_file(&reloc.staged, &reloc.original));
      match moved {
        Ok(()) => report.relocated += 1,
        Err(e) => {
          tracing::error!(
            path = %reloc.original.display(),
            error = %e,
            "failed to restore relocated file"
          );
          failures.push(format!("{}: {e}", reloc.original.display()));
          kept.relocated.push(reloc);
        }
      }
    }

    if failures.is_empty() {
      if let Err(e) = std::fs::remove_dir_all(&self.staging) {
        tracing::warn!(path = %self.staging.display(), error = %e, "failed to remove staging dir");
      }
      return Ok(report);
    }

    kept.patched.reverse();
    kept.relocated.reverse();
    self.entries = kept;
    self.persist()?;
    bail!("{} file(s) could not be restored:\n{}", failures.len(), failures.join("\n"))
  }

  fn slot(&self, kind: &str, index: usize, path: &Path) -> Result<PathBuf> {
    let dir = self.staging.join(kind);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    Ok(dir.join(format!("{index}-{name}")))
  }

  fn persist(&self) -> Result<()> {
    let file = self.staging.join(JOURNAL_FILE);
    let tmp = self.staging.join("journal.json.tmp");
    let json = serde_json::to_string_pretty(&self.entries).context("failed to encode journal")?;
    std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &file).with_context(|| format!("failed to write {}", file.display()))?;
    Ok(())
  }
}

impl Drop for ExportJournal {
  // Reached on panic unwinding or an early return that skipped `restore`.
  fn drop(&mut self) {
    if self.finished {
      return;
    }
    tracing::warn!(
      relocated = self.relocated(),
      patched = self.patched(),
      "export journal dropped before restore; restoring now"
    );
    if let Err(e) = self.restore() {
      tracing::error!(error = %format!("{e:#}"), "restore on drop failed");
    }
  }
}

/// Restore a journal left behind by a killed run. `None` when there was none.
pub fn recover(staging: &Path) -> Result<Option<RestoreReport>> {
  let Some(mut journal) = ExportJournal::open(staging)? else {
    return Ok(None);
  };
  tracing::warn!(
    relocated = journal.relocated(),
    patched = journal.patched(),
    "found journal from an interrupted export; restoring"
  );
  journal.restore().map(Some)
}

fn move_file(from: &Path, to: &Path) -> std::io::Result<()> {
  if std::fs::rename(from, to).is_ok() {
    return Ok(());
  }
  // rename fails across filesystems
  std::fs::copy(from, to)?;
  std::fs::remove_file(from)
}
