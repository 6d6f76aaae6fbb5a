/* crates/herald-server/src/route.rs */

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::slug;

fn colon_param_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

/// Canonical cache key for a path: percent-encoded the way browsers send it,
/// so "/category/côte" and "/category/c%C3%B4te" name the same page.
/// Existing escapes are kept as they are.
pub fn cache_key(path: &str) -> String {
  let Ok(mut url) = reqwest::Url::parse("http://herald.invalid/") else {
    return path.to_string();
  };
  url.set_path(path);
  url.path().to_string()
}

/// Policy for a request to a path that has not been generated yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackMode {
  /// Render on demand, block the requester, cache the result (`block-and-cache`).
  Blocking,
  /// Only prebuilt paths exist; anything else is a 404 (`fail-not-found`).
  NotFound,
}

/// Time-to-live governing background regeneration of a built page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidate {
  After(Duration),
  /// Rendered on every request, never cached.
  Dynamic,
}

impl Revalidate {
  pub fn seconds(secs: u64) -> Self {
    Self::After(Duration::from_secs(secs))
  }

  /// The TTL directive to emit, or `None` when it must be omitted.
  /// A static export has no server to regenerate pages, so the directive is
  /// stripped in export mode.
  pub fn effective(self, export_mode: bool) -> Option<Duration> {
    match self {
      Self::After(ttl) if !export_mode => Some(ttl),
      _ => None,
    }
  }

  pub fn is_dynamic(self) -> bool {
    matches!(self, Self::Dynamic)
  }
}

/// A page kind: parameterized path plus its generation policy.
#[derive(Debug, Clone)]
pub struct RouteTemplate {
  pub name: String,
  /// Axum route syntax, e.g. "/category/{category}"
  pub pattern: String,
  /// Named path parameters, in path order.
  pub params: Vec<String>,
  /// Params passed through verbatim (ids) instead of being slug-decoded.
  pub raw_params: Vec<String>,
  pub fallback: FallbackMode,
  pub revalidate: Revalidate,
}

impl RouteTemplate {
  /// Accepts both `:name` and `{name}` segments.
  pub fn new(name: impl Into<String>, pattern: &str) -> Self {
    let pattern = normalize_pattern(pattern);
    let params = pattern
      .split('/')
      .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
      .map(str::to_string)
      .collect();
    Self {
      name: name.into(),
      pattern,
      params,
      raw_params: Vec::new(),
      fallback: FallbackMode::Blocking,
      revalidate: Revalidate::seconds(60),
    }
  }

  pub fn fallback(mut self, mode: FallbackMode) -> Self {
    self.fallback = mode;
    self
  }

  pub fn revalidate(mut self, revalidate: Revalidate) -> Self {
    self.revalidate = revalidate;
    self
  }

  pub fn raw_param(mut self, name: impl Into<String>) -> Self {
    self.raw_params.push(name.into());
    self
  }

  pub fn is_raw(&self, param: &str) -> bool {
    self.raw_params.iter().any(|p| p == param)
  }

  pub fn is_static(&self) -> bool {
    self.params.is_empty()
  }

  /// Build a concrete path. Values are display names for slug params and
  /// verbatim values for raw params. Returns `None` if a param is missing.
  pub fn render_path(&self, values: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::new();
    for seg in self.pattern.split('/').filter(|s| !s.is_empty()) {
      out.push('/');
      match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(name) => {
          let value = values.get(name).filter(|v| !v.is_empty())?;
          if self.is_raw(name) {
            out.push_str(value);
          } else {
            out.push_str(&slug::encode(value));
          }
        }
        None => out.push_str(seg),
      }
    }
    if out.is_empty() {
      out.push('/');
    }
    Some(out)
  }

  /// Match a concrete path against this template, returning the raw
  /// (still slug-encoded) params.
  pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
    let want: Vec<&str> = self.pattern.split('/').filter(|s| !s.is_empty()).collect();
    let got: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if want.len() != got.len() {
      return None;
    }
    let mut params = HashMap::new();
    for (w, g) in want.iter().zip(&got) {
      match w.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        Some(name) => {
          params.insert(name.to_string(), (*g).to_string());
        }
        None if w == g => {}
        None => return None,
      }
    }
    Some(params)
  }
}

/// Convert `:param` segments to axum's `{param}` syntax.
pub fn normalize_pattern(pattern: &str) -> String {
  let converted = colon_param_re().replace_all(pattern, "{$1}").into_owned();
  if converted.starts_with('/') { converted } else { format!("/{converted}") }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
  }

  #[test]
  fn normalize_colon_params() {
    assert_eq!(normalize_pattern("/"), "/");
    assert_eq!(normalize_pattern("/post/:slug"), "/post/{slug}");
    assert_eq!(normalize_pattern("country/:country/:category"), "/country/{country}/{category}");
    assert_eq!(normalize_pattern("/blog/{slug}"), "/blog/{slug}");
  }

  #[test]
  fn params_in_path_order() {
    let t = RouteTemplate::new("listing", "/country/:country/:category");
    assert_eq!(t.params, vec!["country", "category"]);
    assert!(!t.is_static());
    assert!(RouteTemplate::new("home", "/").is_static());
  }

  #[test]
  fn render_path_encodes_slug_params() {
    let t = RouteTemplate::new("category", "/category/{category}");
    assert_eq!(
      t.render_path(&values(&[("category", "Massage Parlors")])).as_deref(),
      Some("/category/massage-parlors")
    );
    assert_eq!(t.render_path(&values(&[])), None);
    assert_eq!(RouteTemplate::new("home", "/").render_path(&values(&[])).as_deref(), Some("/"));
  }

  #[test]
  fn cache_key_encodes_unicode_once() {
    assert_eq!(cache_key("/category/côte-divoire"), "/category/c%C3%B4te-divoire");
    assert_eq!(cache_key("/category/c%C3%B4te-divoire"), "/category/c%C3%B4te-divoire");
    assert_eq!(cache_key("/post/red-dress"), "/post/red-dress");
    assert_eq!(cache_key("/"), "/");
    assert_eq!(cache_key("buenos-aires"), "/buenos-aires");
  }

  #[test]
  fn render_path_keeps_raw_params() {
    let t = RouteTemplate::new("post", "/post/{id}").raw_param("id");
    assert_eq!(t.render_path(&values(&[("id", "A1b2")])).as_deref(), Some("/post/A1b2"));
  }

  #[test]
  fn matches_extracts_params() {
    let t = RouteTemplate::new("listing", "/country/{country}/{category}");
    let params = t.matches("/country/united-states/dating").expect("should match");
    assert_eq!(params["country"], "united-states");
    assert_eq!(params["category"], "dating");
    assert!(t.matches("/country/united-states").is_none());
    assert!(t.matches("/city/united-states/dating").is_none());
    assert!(RouteTemplate::new("home", "/").matches("/").is_some());
  }

  #[test]
  fn revalidate_stripped_in_export_mode() {
    let ttl = Revalidate::seconds(60);
    assert_eq!(ttl.effective(false), Some(Duration::from_secs(60)));
    assert_eq!(ttl.effective(true), None);
    assert_eq!(Revalidate::Dynamic.effective(false), None);
    assert!(Revalidate::Dynamic.is_dynamic());
  }
}
