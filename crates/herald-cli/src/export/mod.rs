/* crates/herald-cli/src/export/mod.rs */

// Publish-time route exclusion: routes that need a live server are moved
// out of the tree and TTL directives stripped from the rest, the static
// build runs, and everything is put back however the build ends.

mod journal;
mod strip;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use futures_util::FutureExt;

use crate::config::ExportSection;
use crate::ui;

pub use journal::{ExportJournal, recover};
pub use strip::{DirectiveStripper, route_files};

pub struct ExportPlan {
  pub routes_dir: PathBuf,
  /// Absolute paths of the route files to relocate.
  pub exclude: Vec<PathBuf>,
  pub stripper: DirectiveStripper,
  pub extensions: Vec<String>,
  pub staging_dir: PathBuf,
}

impl ExportPlan {
  pub fn from_config(section: &ExportSection, base_dir: &Path) -> Result<Self> {
    let routes_dir = base_dir.join(&section.routes_dir);
    Ok(Self {
      exclude: section.exclude.iter().map(|p| routes_dir.join(p)).collect(),
      stripper: DirectiveStripper::new(&section.directive)?,
      extensions: section.extensions.clone(),
      staging_dir: base_dir.join(&section.staging_dir),
      routes_dir,
    })
  }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassSummary {
  pub relocated: usize,
  pub patched: usize,
}

/// The pass was cut short by Ctrl-C or SIGTERM. The tree is restored before
/// this error surfaces.
#[derive(Debug)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("export interrupted; route tree restored")
  }
}

impl std::error::Error for Interrupted {}

/// Relocate and patch, checking `interrupted` before every change.
fn prepare(
  plan: &ExportPlan,
  journal: &mut ExportJournal,
  mut interrupted: impl FnMut() -> bool,
) -> Result<PassSummary> {
  let mut summary = PassSummary::default();
  for path in &plan.exclude {
    if interrupted() {
      return Err(anyhow::Error::new(Interrupted));
    }
    if journal.relocate(path)? {
      ui::detail(&format!("excluded {}", path.display()));
      summary.relocated += 1;
    }
  }
  for file in route_files(&plan.routes_dir, &plan.extensions, &plan.staging_dir)? {
    if interrupted() {
      return Err(anyhow::Error::new(Interrupted));
    }
    let content =
      std::fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    if let Some(stripped) = plan.stripper.strip(&content) {
      journal.patch(&file, &stripped)?;
      summary.patched += 1;
    }
  }
  Ok(summary)
}

/// Run `build` inside the exclusion pass, restoring on Ctrl-C or SIGTERM.
/// The signal listeners are in place before the tree is touched.
pub async fn run_export_pass<F, Fut>(plan: &ExportPlan, build: F) -> Result<PassSummary>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<()>>,
{
  let signals = ShutdownSignals::install()?;
  run_export_pass_until(plan, build, signals.received()).await
}

/// As [`run_export_pass`], with the interruption source supplied by the caller.
/// `interrupt` is polled between file changes, so it must already be armed.
pub async fn run_export_pass_until<F, Fut, S>(
  plan: &ExportPlan,
  build: F,
  interrupt: S,
) -> Result<PassSummary>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<()>>,
  S: Future<Output = ()>,
{
  if let Some(report) = recover(&plan.staging_dir)? {
    ui::warn(&format!(
      "restored {} relocated and {} patched file(s) left by an interrupted export",
      report.relocated, report.patched
    ));
  }

  tokio::pin!(interrupt);
  // Dropped on panic, which restores through `Drop`.
  let mut journal = ExportJournal::begin(&plan.staging_dir)?;
  let prepared = prepare(plan, &mut journal, || interrupt.as_mut().now_or_never().is_some());
  let outcome = match prepared {
    Ok(summary) => {
      ui::detail(&format!(
        "{} route(s) excluded, {} directive(s) stripped",
        summary.relocated, summary.patched
      ));
      tokio::select! {
        result = build() => result.map(|()| summary),
        () = &mut interrupt => Err(anyhow::Error::new(Interrupted)),
      }
    }
    Err(e) if e.is::<Interrupted>() => Err(e),
    Err(e) => Err(e.context("failed to prepare route tree for export")),
  };

  let restored = journal.restore();
  if let Ok(report) = &restored {
    tracing::info!(relocated = report.relocated, patched = report.patched, "route tree restored");
  }
  match (outcome, restored) {
    (Ok(summary), Ok(_)) => Ok(summary),
    (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    (Err(e), Err(restore)) => Err(e.context(format!("restore also failed: {restore:#}"))),
  }
}

/// Ctrl-C and SIGTERM listeners. Registration happens in `install`, so a
/// signal sent before anything awaits `received` is still seen.
struct ShutdownSignals {
  #[cfg(unix)]
  interrupt: tokio::signal::unix::Signal,
  #[cfg(unix)]
  terminate: tokio::signal::unix::Signal,
  #[cfg(windows)]
  ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
  #[cfg(unix)]
  fn install() -> Result<Self> {
    use tokio::signal::unix::{SignalKind, signal};
    Ok(Self {
      interrupt: signal(SignalKind::interrupt()).context("failed to listen for Ctrl-C")?,
      terminate: signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?,
    })
  }

  #[cfg(windows)]
  fn install() -> Result<Self> {
    Ok(Self { ctrl_c: tokio::signal::windows::ctrl_c().context("failed to listen for Ctrl-C")? })
  }

  #[cfg(unix)]
  async fn received(mut self) {
    tokio::select! {
      _ = self.interrupt.recv() => {}
      _ = self.terminate.recv() => {}
    }
  }

  #[cfg(windows)]
  async fn received(mut self) {
    self.ctrl_c.recv().await;
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::time::Duration;

  use super::*;

  const EXCLUDED: [&str; 3] = ["api/revalidate.toml", "sitemap.toml", "redirects.toml"];

  fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
  }

  /// Every file under `root` except the staging area, with its bytes.
  fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
      for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.ends_with(".herald") {
          continue;
        }
        if path.is_dir() {
          pending.push(path);
        } else {
          files.insert(path.clone(), std::fs::read(&path).unwrap());
        }
      }
    }
    files
  }

  fn fixture() -> (tempfile::TempDir, ExportPlan) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    for rel in EXCLUDED {
      write(root, &format!("routes/{rel}"), b"kind = \"server\"\n");
    }
    write(root, "routes/home.toml", b"name = \"home\"\nrevalidate = 300\n");
    write(
      root,
      "routes/post.toml",
      b"name = \"post\"\nrevalidate = 60\npattern = \"/post/{slug}\"\n",
    );
    write(root, "routes/search.toml", b"name = \"search\"\n");
    let plan = ExportPlan::from_config(&ExportSection::default(), root).unwrap();
    (dir, plan)
  }

  #[tokio::test]
  async fn success_restores_tree() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    let routes = plan.routes_dir.clone();

    let summary = run_export_pass(&plan, || async move {
      anyhow::ensure!(!routes.join("sitemap.toml").exists(), "sitemap still present");
      let home = std::fs::read_to_string(routes.join("home.toml"))?;
      anyhow::ensure!(home == "name = \"home\"\n", "directive not stripped: {home}");
      Ok(())
    })
    .await
    .unwrap();

    assert_eq!(summary, PassSummary { relocated: 3, patched: 2 });
    assert_eq!(snapshot(dir.path()), before);
    assert!(!plan.staging_dir.exists());
  }

  #[tokio::test]
  async fn build_failure_restores_then_propagates() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    let err = run_export_pass(&plan, || async { anyhow::bail!("build exited with status 1") })
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "build exited with status 1");
    assert_eq!(snapshot(dir.path()), before);
    assert!(!plan.staging_dir.exists());
  }

  #[tokio::test]
  async fn prepare_failure_restores_partial_work() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let exclude: Vec<String> = (0..8).map(|i| format!("api/server-{i}.toml")).collect();
    // Only three of the eight exclusions exist.
    for rel in &exclude[..3] {
      write(root, &format!("routes/{rel}"), b"revalidate = 1\n");
    }
    // Twelve route files with directives; the sixth is not UTF-8 and aborts
    // the scan after five have been patched.
    for i in 0..12 {
      let content: &[u8] =
        if i == 5 { b"revalidate = 1\n\xff\xfe" } else { b"revalidate = 1\nok = true\n" };
      write(root, &format!("routes/page-{i:02}.toml"), content);
    }
    let section = ExportSection { exclude, ..Default::default() };
    let plan = ExportPlan::from_config(&section, root).unwrap();
    let before = snapshot(root);

    let mut built = false;
    let err = run_export_pass(&plan, || {
      built = true;
      async { Ok(()) }
    })
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("failed to prepare route tree"), "{err:#}");
    assert!(!built);
    assert_eq!(snapshot(root), before);
    assert!(!plan.staging_dir.exists());
  }

  async fn exploding_build() -> Result<()> {
    panic!("build panicked")
  }

  #[tokio::test]
  async fn panic_in_build_restores_tree() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    let staging = plan.staging_dir.clone();
    let handle = tokio::spawn(async move { run_export_pass(&plan, exploding_build).await });
    assert!(handle.await.unwrap_err().is_panic());
    assert_eq!(snapshot(dir.path()), before);
    assert!(!staging.exists());
  }

  #[tokio::test]
  async fn interruption_kills_build_and_restores() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    let cwd = dir.path().to_path_buf();
    let err = run_export_pass_until(
      &plan,
      || async move { crate::shell::run_command(&cwd, "sleep 30", "build", &[]).await },
      tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap_err();
    assert!(err.downcast_ref::<Interrupted>().is_some());
    assert_eq!(snapshot(dir.path()), before);
  }

  #[tokio::test]
  async fn signal_before_prepare_finishes_skips_build_and_restores() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    let mut built = false;
    let err = run_export_pass_until(
      &plan,
      || {
        built = true;
        async { Ok(()) }
      },
      std::future::ready(()),
    )
    .await
    .unwrap_err();
    assert!(err.downcast_ref::<Interrupted>().is_some(), "{err:#}");
    assert!(!built);
    assert_eq!(snapshot(dir.path()), before);
    assert!(!plan.staging_dir.exists());
  }

  #[tokio::test]
  async fn signal_midway_through_prepare_undoes_partial_work() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    // Fires on the fifth check: three relocations and one patch are done.
    let mut checks = 0;
    let interrupt = std::future::poll_fn(move |_| {
      checks += 1;
      if checks >= 5 { std::task::Poll::Ready(()) } else { std::task::Poll::Pending }
    });
    let err = run_export_pass_until(&plan, || async { Ok(()) }, interrupt).await.unwrap_err();
    assert!(err.downcast_ref::<Interrupted>().is_some(), "{err:#}");
    assert_eq!(snapshot(dir.path()), before);
    assert!(!plan.staging_dir.exists());
  }

  #[tokio::test]
  async fn leftover_journal_is_recovered_at_startup() {
    let (dir, plan) = fixture();
    let before = snapshot(dir.path());
    let mut journal = ExportJournal::begin(&plan.staging_dir).unwrap();
    journal.relocate(&plan.exclude[0]).unwrap();
    journal.patch(&plan.routes_dir.join("home.toml"), "").unwrap();
    std::mem::forget(journal);
    assert_ne!(snapshot(dir.path()), before);

    let summary = run_export_pass(&plan, || async { Ok(()) }).await.unwrap();
    assert_eq!(summary, PassSummary { relocated: 3, patched: 2 });
    assert_eq!(snapshot(dir.path()), before);
  }
}
