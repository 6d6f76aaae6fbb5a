/* crates/herald-server/src/errors.rs */

use std::fmt;

use crate::gateway::GatewayError;

/// What went wrong, as far as a caller of the site can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// Environment or route configuration rejected at startup.
  InvalidConfig,
  /// Invalidation attempted without the server-held secret.
  InvalidSecret,
  /// No page, sitemap section or route for the request.
  NotFound,
  /// The content API failed or answered something unusable.
  Upstream,
  UpstreamTimeout,
  /// Rendering or writing a page failed inside Herald.
  Render,
}

impl ErrorKind {
  /// Wire code sent in JSON error bodies.
  pub fn code(self) -> &'static str {
    match self {
      Self::InvalidConfig => "INVALID_CONFIG",
      Self::InvalidSecret => "INVALID_SECRET",
      Self::NotFound => "NOT_FOUND",
      Self::Upstream => "UPSTREAM_ERROR",
      Self::UpstreamTimeout => "UPSTREAM_TIMEOUT",
      Self::Render => "RENDER_FAULT",
    }
  }

  pub fn status(self) -> u16 {
    match self {
      Self::InvalidConfig => 400,
      Self::InvalidSecret => 401,
      Self::NotFound => 404,
      Self::Upstream => 502,
      Self::UpstreamTimeout => 504,
      Self::Render => 500,
    }
  }
}

#[derive(Debug, Clone)]
pub struct HeraldError {
  kind: ErrorKind,
  message: String,
}

impl HeraldError {
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self { kind, message: message.into() }
  }

  pub fn validation(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::InvalidConfig, msg)
  }

  pub fn unauthorized(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::InvalidSecret, msg)
  }

  pub fn not_found(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, msg)
  }

  pub fn gateway(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::Upstream, msg)
  }

  pub fn internal(msg: impl Into<String>) -> Self {
    Self::new(ErrorKind::Render, msg)
  }

  /// Prefix the message with what was being done, e.g. "sitemap posts".
  pub fn context(mut self, what: impl fmt::Display) -> Self {
    self.message = format!("{what}: {}", self.message);
    self
  }

  pub fn kind(&self) -> ErrorKind {
    self.kind
  }

  pub fn code(&self) -> &'static str {
    self.kind.code()
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn status(&self) -> u16 {
    self.kind.status()
  }
}

impl From<GatewayError> for HeraldError {
  fn from(err: GatewayError) -> Self {
    let kind = match &err {
      GatewayError::Http(e) if e.is_timeout() => ErrorKind::UpstreamTimeout,
      // Our own endpoint table, not the API, is at fault.
      GatewayError::UnknownResource(_) | GatewayError::InvalidUrl(_) => ErrorKind::InvalidConfig,
      _ => ErrorKind::Upstream,
    };
    Self::new(kind, err.to_string())
  }
}

impl fmt::Display for HeraldError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.code(), self.message)
  }
}

impl std::error::Error for HeraldError {}
