/* crates/herald-server/src/server.rs */

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::cache::PageCache;
use crate::config::HeraldConfig;
use crate::errors::HeraldError;
use crate::gateway::{Gateway, GatewayError};
use crate::materialize::Materializer;
use crate::page::{PageDef, PageResult};
use crate::redirect::RedirectRule;
use crate::revalidate::{InvalidationReport, InvalidationRequest, Invalidator};
use crate::route::{RouteTemplate, cache_key};
use crate::sitemap::Sitemap;

/// A concrete path plus the raw params that produce it.
pub type PrebuiltPath = (String, HashMap<String, String>);

/// Framework-agnostic parts extracted from `HeraldServer`.
/// Adapter crates consume this to build framework-specific routers.
#[derive(Clone)]
pub struct HeraldParts {
  pub pages: Vec<Arc<PageDef>>,
  pub materializer: Materializer,
  pub cache: PageCache,
  pub config: HeraldConfig,
  pub invalidator: Arc<Invalidator>,
  pub sitemap: Option<Arc<Sitemap>>,
  pub redirects: Vec<RedirectRule>,
}

impl HeraldParts {
  pub fn gateway(&self) -> Arc<dyn Gateway> {
    self.materializer.gateway()
  }

  pub fn templates(&self) -> Vec<&RouteTemplate> {
    self.pages.iter().map(|p| &p.template).collect()
  }

  /// The page serving `path`. Literal segments beat params, so "/partners"
  /// wins over "/{city}".
  pub fn route(&self, path: &str) -> Option<(Arc<PageDef>, HashMap<String, String>)> {
    self
      .pages
      .iter()
      .filter_map(|page| page.template.matches(path).map(|params| (page, params)))
      .max_by_key(|(page, params)| page.template.pattern.split('/').count() - params.len())
      .map(|(page, params)| (page.clone(), params))
  }

  /// Serve one page through the cache, materializing on demand. `path` may
  /// arrive percent-encoded or not; both forms share one cache entry.
  pub async fn render(
    &self,
    page: &Arc<PageDef>,
    path: &str,
    raw_params: HashMap<String, String>,
    query: HashMap<String, String>,
  ) -> Arc<PageResult> {
    let materializer = self.materializer.clone();
    let page_def = page.clone();
    self
      .cache
      .serve(&cache_key(path), &page.template, move || {
        async move { materializer.materialize(&page_def, &raw_params, &query).await }.boxed()
      })
      .await
  }

  pub fn invalidate(&self, req: &InvalidationRequest) -> Result<InvalidationReport, HeraldError> {
    self.invalidator.invalidate(&self.cache, &self.templates(), req)
  }

  /// Every path of `page` known at build time: the single path of a
  /// parameterless template, or whatever its static-paths loader returns.
  pub async fn prebuilt_paths(&self, page: &PageDef) -> Result<Vec<PrebuiltPath>, GatewayError> {
    let template = &page.template;
    let value_sets = if template.is_static() {
      vec![Default::default()]
    } else if let Some(load) = &page.static_paths {
      load(self.gateway()).await?
    } else {
      return Ok(Vec::new());
    };

    let mut paths = Vec::new();
    for values in value_sets {
      let Some(path) = template.render_path(&values) else {
        tracing::warn!(route = %template.name, ?values, "static path missing a param");
        continue;
      };
      let raw = template.matches(&path).unwrap_or_default();
      paths.push((path, raw));
    }
    Ok(paths)
  }

  /// Build every prebuilt path of every cached template into the cache.
  /// Returns the number of pages stored.
  pub async fn prerender(&self) -> usize {
    let mut built = 0;
    for page in self.pages.iter().filter(|p| !p.template.revalidate.is_dynamic()) {
      let paths = match self.prebuilt_paths(page).await {
        Ok(paths) => paths,
        Err(e) => {
          tracing::warn!(
            route = %page.template.name,
            error = %e,
            "could not enumerate static paths"
          );
          continue;
        }
      };
      for (path, raw) in paths {
        let result = self.materializer.materialize(page, &raw, &HashMap::new()).await;
        self.cache.insert_built(&cache_key(&path), result, page.template.revalidate);
        built += 1;
      }
    }
    tracing::info!(pages = built, "prerender complete");
    built
  }
}

pub struct HeraldServer {
  gateway: Arc<dyn Gateway>,
  pages: Vec<PageDef>,
  config: HeraldConfig,
  sitemap: Option<Sitemap>,
  redirects: Vec<RedirectRule>,
  site_url_key: Option<String>,
  slug_key: Option<String>,
}

impl HeraldServer {
  pub fn new(gateway: Arc<dyn Gateway>) -> Self {
    Self {
      gateway,
      pages: Vec::new(),
      config: HeraldConfig::default(),
      sitemap: None,
      redirects: Vec::new(),
      site_url_key: None,
      slug_key: None,
    }
  }

  pub fn page(mut self, page: PageDef) -> Self {
    self.pages.push(page);
    self
  }

  pub fn config(mut self, config: HeraldConfig) -> Self {
    self.config = config;
    self
  }

  pub fn sitemap(mut self, sitemap: Sitemap) -> Self {
    self.sitemap = Some(sitemap);
    self
  }

  pub fn redirect(mut self, rule: RedirectRule) -> Self {
    self.redirects.push(rule);
    self
  }

  /// Cache keys the invalidation endpoint derives from `site_url` and `slug`.
  pub fn invalidation_keys(
    mut self,
    site_url_pattern: impl Into<String>,
    slug_pattern: impl Into<String>,
  ) -> Self {
    self.site_url_key = Some(site_url_pattern.into());
    self.slug_key = Some(slug_pattern.into());
    self
  }

  /// Consume the builder, returning framework-agnostic parts for an adapter.
  pub fn into_parts(self) -> HeraldParts {
    let mut invalidator = Invalidator::new(self.config.revalidate_secret.clone());
    if let Some(pattern) = self.site_url_key {
      invalidator = invalidator.site_url_pattern(pattern);
    }
    if let Some(pattern) = self.slug_key {
      invalidator = invalidator.slug_pattern(pattern);
    }
    if self.config.revalidate_secret.is_none() {
      tracing::warn!("REVALIDATE_SECRET is not set; on-demand invalidation is disabled");
    }

    HeraldParts {
      pages: self.pages.into_iter().map(Arc::new).collect(),
      materializer: Materializer::new(self.gateway),
      cache: PageCache::with_capacity(self.config.cache_capacity),
      config: self.config,
      invalidator: Arc::new(invalidator),
      sitemap: self.sitemap.map(Arc::new),
      redirects: self.redirects,
    }
  }
}
