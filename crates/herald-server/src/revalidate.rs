/* crates/herald-server/src/revalidate.rs */

//! On-demand invalidation: an authenticated request that forces cached pages
//! stale so the next visit regenerates them.

use std::collections::HashMap;

use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::cache::{PageCache, StaleOutcome};
use crate::errors::HeraldError;
use crate::route::{RouteTemplate, cache_key};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationRequest {
  pub secret: Option<String>,
  pub site_url: Option<String>,
  pub slug: Option<String>,
}

impl InvalidationRequest {
  /// Read `secret`, `site_url` and `slug` from a query string map. Blank
  /// values count as absent.
  pub fn from_query(query: &HashMap<String, String>) -> Self {
    let take = |key: &str| query.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    Self { secret: take("secret"), site_url: take("site_url"), slug: take("slug") }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFailure {
  pub key: String,
  pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
  /// Keys whose cache entry is now stale (or was never built).
  pub revalidated: Vec<String>,
  pub failed: Vec<KeyFailure>,
}

impl InvalidationReport {
  pub fn is_complete(&self) -> bool {
    self.failed.is_empty()
  }
}

pub struct Invalidator {
  secret: Option<String>,
  site_url_pattern: String,
  slug_pattern: String,
}

impl Invalidator {
  /// A `None` secret rejects every request.
  pub fn new(secret: Option<String>) -> Self {
    Self {
      secret: secret.filter(|s| !s.is_empty()),
      site_url_pattern: "/{site_url}".to_string(),
      slug_pattern: "/post/{slug}".to_string(),
    }
  }

  /// Path the `site_url` parameter purges, e.g. "/{site_url}".
  pub fn site_url_pattern(mut self, pattern: impl Into<String>) -> Self {
    self.site_url_pattern = pattern.into();
    self
  }

  /// Path the `slug` parameter purges, e.g. "/post/{slug}".
  pub fn slug_pattern(mut self, pattern: impl Into<String>) -> Self {
    self.slug_pattern = pattern.into();
    self
  }

  /// Exact match against the server-held secret, compared in constant time.
  pub fn authorize(&self, provided: Option<&str>) -> Result<(), HeraldError> {
    let (Some(expected), Some(provided)) = (self.secret.as_deref(), provided) else {
      return Err(HeraldError::unauthorized("Invalid secret"));
    };
    let matches: bool = expected.as_bytes().ct_eq(provided.as_bytes()).into();
    if matches { Ok(()) } else { Err(HeraldError::unauthorized("Invalid secret")) }
  }

  /// Root first, then the site_url and slug derived keys, without duplicates.
  pub fn resolve_keys(&self, req: &InvalidationRequest) -> Vec<String> {
    let mut keys = vec!["/".to_string()];
    let derived = [
      req.site_url.as_deref().map(|v| fill(&self.site_url_pattern, "site_url", v)),
      req.slug.as_deref().map(|v| fill(&self.slug_pattern, "slug", v)),
    ];
    for key in derived.into_iter().flatten() {
      if !keys.contains(&key) {
        keys.push(key);
      }
    }
    keys
  }

  /// Authorize, then mark every resolved key stale. A key that no route
  /// serves is reported as failed; the remaining keys are still attempted.
  pub fn invalidate(
    &self,
    cache: &PageCache,
    routes: &[&RouteTemplate],
    req: &InvalidationRequest,
  ) -> Result<InvalidationReport, HeraldError> {
    self.authorize(req.secret.as_deref())?;

    let mut report = InvalidationReport::default();
    for key in self.resolve_keys(req) {
      if !routes.iter().any(|t| t.matches(&key).is_some()) {
        report.failed.push(KeyFailure { key, error: "no route serves this path".to_string() });
        continue;
      }
      match cache.mark_stale(&key) {
        StaleOutcome::MarkedStale => tracing::info!(key = %key, "marked stale"),
        StaleOutcome::NotCached => {
          tracing::debug!(key = %key, "not cached; next request builds it");
        }
      }
      report.revalidated.push(key);
    }
    Ok(report)
  }
}

/// Substitute `{name}` in a key pattern and canonicalize the result the way
/// page paths are keyed. Leading slashes in the value are dropped so "/a" and
/// "a" purge the same page.
fn fill(pattern: &str, name: &str, value: &str) -> String {
  cache_key(&pattern.replace(&format!("{{{name}}}"), value.trim_start_matches('/')))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::EntryState;
  use crate::page::{PageResult, Props};
  use crate::route::Revalidate;

  fn req(secret: Option<&str>, site_url: Option<&str>, slug: Option<&str>) -> InvalidationRequest {
    InvalidationRequest {
      secret: secret.map(str::to_string),
      site_url: site_url.map(str::to_string),
      slug: slug.map(str::to_string),
    }
  }

  fn routes() -> Vec<RouteTemplate> {
    vec![
      RouteTemplate::new("home", "/"),
      RouteTemplate::new("post", "/post/{slug}"),
      RouteTemplate::new("city", "/{city}"),
    ]
  }

  fn warm(cache: &PageCache, key: &str) {
    cache.insert_built(
      key,
      PageResult::Ok { props: Props::new(), revalidate: Revalidate::seconds(600) },
      Revalidate::seconds(600),
    );
  }

  #[test]
  fn from_query_reads_params() {
    let q: HashMap<String, String> = [("secret", "s3"), ("slug", "abc"), ("site_url", " ")]
      .into_iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    assert_eq!(InvalidationRequest::from_query(&q), req(Some("s3"), None, Some("abc")));
  }

  #[test]
  fn authorize_requires_exact_secret() {
    let inv = Invalidator::new(Some("s3cret".into()));
    assert!(inv.authorize(Some("s3cret")).is_ok());
    assert_eq!(inv.authorize(Some("s3cre")).unwrap_err().status(), 401);
    assert!(inv.authorize(Some("s3cret ")).is_err());
    assert!(inv.authorize(None).is_err());
  }

  #[test]
  fn unset_server_secret_rejects_everything() {
    assert!(Invalidator::new(None).authorize(Some("")).is_err());
    assert!(Invalidator::new(Some(String::new())).authorize(Some("")).is_err());
  }

  #[test]
  fn keys_always_include_root() {
    let inv = Invalidator::new(Some("x".into()));
    assert_eq!(inv.resolve_keys(&req(Some("x"), None, None)), vec!["/"]);
    assert_eq!(
      inv.resolve_keys(&req(Some("x"), Some("buenos-aires"), Some("red-dress"))),
      vec!["/", "/buenos-aires", "/post/red-dress"]
    );
    assert_eq!(inv.resolve_keys(&req(Some("x"), Some("/"), None)), vec!["/"]);
  }

  #[tokio::test(start_paused = true)]
  async fn wrong_secret_changes_nothing() {
    let cache = PageCache::new();
    warm(&cache, "/");
    warm(&cache, "/post/a");
    let inv = Invalidator::new(Some("right".into()));
    let templates = routes();
    let refs: Vec<&RouteTemplate> = templates.iter().collect();

    let err = inv.invalidate(&cache, &refs, &req(Some("wrong"), None, Some("a"))).unwrap_err();
    assert_eq!(err.status(), 401);
    assert!(matches!(cache.state("/"), EntryState::Built { .. }));
    assert!(matches!(cache.state("/post/a"), EntryState::Built { .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn right_secret_marks_root_and_derived_keys_stale() {
    let cache = PageCache::new();
    warm(&cache, "/");
    warm(&cache, "/post/a");
    warm(&cache, "/post/b");
    let inv = Invalidator::new(Some("right".into()));
    let templates = routes();
    let refs: Vec<&RouteTemplate> = templates.iter().collect();

    let report = inv.invalidate(&cache, &refs, &req(Some("right"), None, Some("a"))).unwrap();
    assert_eq!(report.revalidated, vec!["/", "/post/a"]);
    assert!(report.is_complete());
    assert_eq!(cache.state("/"), EntryState::Stale { revalidating: false });
    assert_eq!(cache.state("/post/a"), EntryState::Stale { revalidating: false });
    assert!(matches!(cache.state("/post/b"), EntryState::Built { .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn unicode_slug_purges_the_page_browsers_request() {
    let cache = PageCache::new();
    warm(&cache, "/");
    warm(&cache, "/post/c%C3%B4te-divoire");
    let inv = Invalidator::new(Some("k".into()));
    let templates = routes();
    let refs: Vec<&RouteTemplate> = templates.iter().collect();

    let report =
      inv.invalidate(&cache, &refs, &req(Some("k"), None, Some("côte-divoire"))).unwrap();
    assert_eq!(report.revalidated, vec!["/", "/post/c%C3%B4te-divoire"]);
    assert_eq!(
      cache.state("/post/c%C3%B4te-divoire"),
      EntryState::Stale { revalidating: false }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn unroutable_key_fails_alone() {
    let cache = PageCache::new();
    warm(&cache, "/");
    let inv = Invalidator::new(Some("k".into())).site_url_pattern("/city/{site_url}/extra");
    let templates = routes();
    let refs: Vec<&RouteTemplate> = templates.iter().collect();

    let report =
      inv.invalidate(&cache, &refs, &req(Some("k"), Some("paris"), Some("red"))).unwrap();
    assert_eq!(report.revalidated, vec!["/", "/post/red"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].key, "/city/paris/extra");
    assert_eq!(cache.state("/"), EntryState::Stale { revalidating: false });
  }
}
