/* crates/herald-cli/src/ui.rs */

// Coloured terminal output for user-facing progress. Diagnostics go
// through `tracing`; these lines are what a person running the CLI reads.

#![allow(clippy::print_stdout, clippy::print_stderr)]

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

/// Step header: `==> building`
pub fn arrow(msg: &str) {
  println!("{CYAN}{BOLD}==>{RESET} {BOLD}{msg}{RESET}");
}

pub fn detail(msg: &str) {
  println!("    {msg}");
}

pub fn ok(msg: &str) {
  println!("{GREEN}{BOLD}  ok{RESET} {msg}");
}

pub fn warn(msg: &str) {
  eprintln!("{YELLOW}{BOLD}warn{RESET} {msg}");
}

pub fn error(msg: &str) {
  eprintln!("{RED}{BOLD}error{RESET} {msg}");
}
