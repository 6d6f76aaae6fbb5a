/* crates/herald-cli/src/shell.rs */

// Shell command helpers shared across build and export.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::process::Command;

use crate::ui::{self, DIM, RESET};

/// Run a shell command with inherited stdio, bail on a non-zero exit.
/// The child is killed if the returned future is dropped, so an interrupted
/// build never outlives the pass that started it.
pub(crate) async fn run_command(
  base_dir: &Path,
  command: &str,
  label: &str,
  env: &[(&str, &str)],
) -> Result<()> {
  ui::detail(&format!("{DIM}{command}{RESET}"));
  let mut cmd = Command::new("sh");
  cmd.args(["-c", command]);
  cmd.current_dir(base_dir);
  cmd.kill_on_drop(true);
  for (k, v) in env {
    cmd.env(k, v);
  }
  let status = cmd.status().await.with_context(|| format!("failed to run {label}"))?;
  if !status.success() {
    bail!("{label} exited with status {status}");
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    run_command(dir.path(), "true", "noop", &[]).await.unwrap();
    let err = run_command(dir.path(), "exit 3", "build", &[]).await.unwrap_err();
    assert!(err.to_string().starts_with("build exited with status"), "{err}");
  }

  #[tokio::test]
  async fn env_reaches_child() {
    let dir = tempfile::tempdir().unwrap();
    run_command(dir.path(), r#"test "$NEXT_EXPORT" = 1"#, "check", &[("NEXT_EXPORT", "1")])
      .await
      .unwrap();
  }
}
