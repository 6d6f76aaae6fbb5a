/* crates/herald-server/src/gateway.rs */

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("no endpoint registered for resource '{0}'")]
  UnknownResource(String),

  #[error("missing parameter '{param}' for resource '{kind}'")]
  MissingParam { kind: String, param: String },

  #[error("invalid url: {0}")]
  InvalidUrl(String),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} returned HTTP {status}")]
  Status { url: String, status: u16 },

  #[error("JSON error: {0}")]
  Decode(#[from] serde_json::Error),

  #[error("resource '{0}' returned neither an object nor an array")]
  Shape(String),

  #[error("{0}")]
  Other(String),
}

/// One call to the remote content API. Built fresh for every render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
  pub kind: String,
  /// Decoded path-level parameters.
  pub params: BTreeMap<String, String>,
  /// Query modifiers, e.g. `page` or a device-width bucket.
  pub query: BTreeMap<String, String>,
}

impl ResourceRequest {
  pub fn new(kind: impl Into<String>) -> Self {
    Self { kind: kind.into(), ..Default::default() }
  }

  pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.query.insert(key.into(), value.into());
    self
  }
}

/// Typed access to the remote content API: one idempotent GET per resource
/// kind. Calls must be safe to run concurrently, and a rejection of one call
/// must not affect its siblings.
pub trait Gateway: Send + Sync {
  fn fetch(&self, req: ResourceRequest) -> BoxFuture<Result<Value, GatewayError>>;
}

/// Map a responsive width (px) onto the asset bucket the API understands.
pub fn device_bucket(width: Option<u32>) -> &'static str {
  match width {
    Some(w) if w <= 640 => "mobile",
    Some(w) if w <= 1024 => "tablet",
    _ => "desktop",
  }
}

// -- HTTP --

pub struct HttpGateway {
  client: reqwest::Client,
  base_url: String,
  /// Resource kind -> path template, e.g. "post" -> "/posts/{slug}"
  endpoints: HashMap<String, String>,
}

impl HttpGateway {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url: base_url.into(), endpoints: HashMap::new() })
  }

  pub fn endpoint(mut self, kind: impl Into<String>, path: impl Into<String>) -> Self {
    self.endpoints.insert(kind.into(), path.into());
    self
  }

  pub fn build_url(&self, req: &ResourceRequest) -> Result<reqwest::Url, GatewayError> {
    let template =
      self.endpoints.get(&req.kind).ok_or_else(|| GatewayError::UnknownResource(req.kind.clone()))?;
    let mut url = reqwest::Url::parse(&self.base_url)
      .map_err(|e| GatewayError::InvalidUrl(format!("{}: {e}", self.base_url)))?;

    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|()| GatewayError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?;
      segments.pop_if_empty();
      for seg in template.split('/').filter(|s| !s.is_empty()) {
        match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
          Some(name) => {
            let value = req.params.get(name).ok_or_else(|| GatewayError::MissingParam {
              kind: req.kind.clone(),
              param: name.to_string(),
            })?;
            segments.push(value);
          }
          None => {
            segments.push(seg);
          }
        }
      }
    }

    if !req.query.is_empty() {
      url.query_pairs_mut().extend_pairs(req.query.iter());
    }
    Ok(url)
  }
}

impl Gateway for HttpGateway {
  fn fetch(&self, req: ResourceRequest) -> BoxFuture<Result<Value, GatewayError>> {
    let url = match self.build_url(&req) {
      Ok(url) => url,
      Err(e) => return Box::pin(async move { Err(e) }),
    };
    let client = self.client.clone();
    Box::pin(async move {
      tracing::debug!(kind = %req.kind, %url, "gateway fetch");
      let resp = client.get(url.clone()).send().await?;
      let status = resp.status();
      if !status.is_success() {
        return Err(GatewayError::Status { url: url.to_string(), status: status.as_u16() });
      }
      let bytes = resp.bytes().await?;
      let value: Value = serde_json::from_slice(&bytes)?;
      if value.is_object() || value.is_array() {
        Ok(value)
      } else {
        Err(GatewayError::Shape(req.kind))
      }
    })
  }
}

// -- In-memory --

type Responder = Arc<dyn Fn(&ResourceRequest) -> Result<Value, GatewayError> + Send + Sync>;

/// Gateway answering from in-process closures. Used by tests and by the
/// offline demo data set.
#[derive(Clone, Default)]
pub struct StaticGateway {
  responders: HashMap<String, Responder>,
  calls: Arc<AtomicUsize>,
}

impl StaticGateway {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn resource<F>(mut self, kind: impl Into<String>, responder: F) -> Self
  where
    F: Fn(&ResourceRequest) -> Result<Value, GatewayError> + Send + Sync + 'static,
  {
    self.responders.insert(kind.into(), Arc::new(responder));
    self
  }

  pub fn value(self, kind: impl Into<String>, value: Value) -> Self {
    self.resource(kind, move |_| Ok(value.clone()))
  }

  pub fn failing(self, kind: impl Into<String>, message: impl Into<String>) -> Self {
    let message = message.into();
    self.resource(kind, move |_| Err(GatewayError::Other(message.clone())))
  }

  /// Number of fetches issued so far.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Gateway for StaticGateway {
  fn fetch(&self, req: ResourceRequest) -> BoxFuture<Result<Value, GatewayError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let responder = self.responders.get(&req.kind).cloned();
    Box::pin(async move {
      match responder {
        Some(responder) => responder(&req),
        None => Err(GatewayError::UnknownResource(req.kind)),
      }
    })
  }
}
