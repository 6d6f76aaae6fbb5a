/* crates/herald-server/src/page.rs */

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::errors::HeraldError;
use crate::gateway::{BoxFuture, Gateway, GatewayError, ResourceRequest};
use crate::route::{Revalidate, RouteTemplate};
use crate::slug;

pub type Props = Map<String, Value>;

/// Outcome of one materialization. Exactly one variant per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum PageResult {
  /// Every declared data key is present, fetched or defaulted.
  Ok { props: Props, revalidate: Revalidate },
  NotFound,
  Redirect { target: String, permanent: bool },
  /// Only produced for dynamic (uncached) templates after an unexpected fault.
  ServerError { fallback_props: Props },
}

impl PageResult {
  pub fn is_ok(&self) -> bool {
    matches!(self, Self::Ok { .. })
  }

  pub fn props(&self) -> Option<&Props> {
    match self {
      Self::Ok { props, .. } => Some(props),
      Self::ServerError { fallback_props } => Some(fallback_props),
      _ => None,
    }
  }
}

/// Route parameters after slug decoding, plus the original slugs and the
/// request query.
#[derive(Debug, Clone, Default)]
pub struct RouteParams {
  decoded: BTreeMap<String, String>,
  raw: BTreeMap<String, String>,
  query: BTreeMap<String, String>,
}

impl RouteParams {
  /// Validate and decode raw path params against a template. Returns `None`
  /// when a required param is missing or blank.
  pub fn resolve(
    template: &RouteTemplate,
    raw: &HashMap<String, String>,
    query: &HashMap<String, String>,
  ) -> Option<Self> {
    let mut params = Self::default();
    for name in &template.params {
      let value = raw.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())?;
      let decoded = if template.is_raw(name) { value.to_string() } else { slug::decode(value) };
      params.decoded.insert(name.clone(), decoded);
      params.raw.insert(name.clone(), value.to_string());
    }
    params.query = query.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    Some(params)
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.decoded.get(name).map(String::as_str)
  }

  /// The param exactly as it appeared in the path.
  pub fn slug(&self, name: &str) -> Option<&str> {
    self.raw.get(name).map(String::as_str)
  }

  pub fn query(&self, name: &str) -> Option<&str> {
    self.query.get(name).map(String::as_str)
  }

  pub fn decoded(&self) -> &BTreeMap<String, String> {
    &self.decoded
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRole {
  /// The entity itself: missing, or lacking `required_field`, means 404.
  Primary { required_field: String },
  /// Supporting data: a failure degrades to the declared default.
  Auxiliary,
}

pub type CustomizeFn = Arc<dyn Fn(&RouteParams, ResourceRequest) -> ResourceRequest + Send + Sync>;

/// One resource a page needs, stored under `data_key` in the page props.
#[derive(Clone)]
pub struct ResourceSpec {
  pub data_key: String,
  pub kind: String,
  pub role: ResourceRole,
  pub default: Value,
  /// Params sent regardless of the route, e.g. `page = "home"` for SEO lookups.
  pub fixed: BTreeMap<String, String>,
  /// Query keys copied from the page request onto the resource request.
  pub forward_query: Vec<String>,
  pub customize: Option<CustomizeFn>,
}

impl ResourceSpec {
  pub fn primary(
    data_key: impl Into<String>,
    kind: impl Into<String>,
    required_field: impl Into<String>,
  ) -> Self {
    Self::with_role(
      data_key,
      kind,
      ResourceRole::Primary { required_field: required_field.into() },
      Value::Object(Map::new()),
    )
  }

  pub fn auxiliary(data_key: impl Into<String>, kind: impl Into<String>, default: Value) -> Self {
    Self::with_role(data_key, kind, ResourceRole::Auxiliary, default)
  }

  fn with_role(
    data_key: impl Into<String>,
    kind: impl Into<String>,
    role: ResourceRole,
    default: Value,
  ) -> Self {
    Self {
      data_key: data_key.into(),
      kind: kind.into(),
      role,
      default,
      fixed: BTreeMap::new(),
      forward_query: Vec::new(),
      customize: None,
    }
  }

  pub fn fixed(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.fixed.insert(key.into(), value.into());
    self
  }

  pub fn forward_query(mut self, key: impl Into<String>) -> Self {
    self.forward_query.push(key.into());
    self
  }

  pub fn customize<F>(mut self, f: F) -> Self
  where
    F: Fn(&RouteParams, ResourceRequest) -> ResourceRequest + Send + Sync + 'static,
  {
    self.customize = Some(Arc::new(f));
    self
  }

  pub fn is_primary(&self) -> bool {
    matches!(self.role, ResourceRole::Primary { .. })
  }

  /// Build the gateway request: decoded route params, then fixed params,
  /// then forwarded query keys, then the custom hook.
  pub fn request(&self, params: &RouteParams) -> ResourceRequest {
    let mut req = ResourceRequest::new(self.kind.clone());
    req.params.extend(params.decoded().iter().map(|(k, v)| (k.clone(), v.clone())));
    req.params.extend(self.fixed.iter().map(|(k, v)| (k.clone(), v.clone())));
    for key in &self.forward_query {
      if let Some(value) = params.query(key) {
        req.query.insert(key.clone(), value.to_string());
      }
    }
    match &self.customize {
      Some(f) => f(params, req),
      None => req,
    }
  }
}

/// Conditional prop shaping applied after all resources settle. An `Err`
/// is an unexpected fault, not a missing entity.
pub type ShapeFn = Arc<dyn Fn(Props, &RouteParams) -> Result<Props, HeraldError> + Send + Sync>;

/// Enumerates the param sets to prebuild (display values, see
/// `RouteTemplate::render_path`).
pub type StaticPathsFn = Arc<
  dyn Fn(Arc<dyn Gateway>) -> BoxFuture<Result<Vec<BTreeMap<String, String>>, GatewayError>>
    + Send
    + Sync,
>;

pub struct PageDef {
  pub template: RouteTemplate,
  pub resources: Vec<ResourceSpec>,
  pub shape: Option<ShapeFn>,
  pub static_paths: Option<StaticPathsFn>,
}

impl PageDef {
  pub fn new(template: RouteTemplate) -> Self {
    Self { template, resources: Vec::new(), shape: None, static_paths: None }
  }

  pub fn resource(mut self, spec: ResourceSpec) -> Self {
    self.resources.push(spec);
    self
  }

  pub fn shape<F>(mut self, f: F) -> Self
  where
    F: Fn(Props, &RouteParams) -> Result<Props, HeraldError> + Send + Sync + 'static,
  {
    self.shape = Some(Arc::new(f));
    self
  }

  pub fn static_paths<F>(mut self, f: F) -> Self
  where
    F: Fn(Arc<dyn Gateway>) -> BoxFuture<Result<Vec<BTreeMap<String, String>>, GatewayError>>
      + Send
      + Sync
      + 'static,
  {
    self.static_paths = Some(Arc::new(f));
    self
  }

  /// Data key of the first primary resource; its payload carries the SEO fields.
  pub fn seo_key(&self) -> Option<&str> {
    self.resources.iter().find(|r| r.is_primary()).map(|r| r.data_key.as_str())
  }

  /// Props with every declared key set to its default.
  pub fn default_props(&self) -> Props {
    self.resources.iter().map(|r| (r.data_key.clone(), r.default.clone())).collect()
  }
}
