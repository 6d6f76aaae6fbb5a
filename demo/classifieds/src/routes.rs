/* demo/classifieds/src/routes.rs */

// Route files under `routes/`: one TOML file per page template, plus three
// files that only make sense with a live server (`api/revalidate.toml`,
// `sitemap.toml`, `redirects.toml`). `herald export` moves those three out
// of the tree for a static build, so each is optional here.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use futures_util::FutureExt;
use herald_server::sitemap::listing_items;
use herald_server::{
  ChangeFreq, FallbackMode, GatewayError, HeraldServer, PageDef, RedirectRule, ResourceRequest,
  ResourceSpec, Revalidate, RouteTemplate, Sitemap, SitemapSource, device_bucket,
};
use serde::Deserialize;
use serde_json::Value;

const INVALIDATION_FILE: &str = "api/revalidate.toml";
const SITEMAP_FILE: &str = "sitemap.toml";
const REDIRECTS_FILE: &str = "redirects.toml";

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Fallback {
  #[default]
  Blocking,
  NotFound,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PageFile {
  name: String,
  pattern: String,
  #[serde(default)]
  raw_params: Vec<String>,
  #[serde(default)]
  fallback: Fallback,
  /// Seconds. Absent means the template default.
  revalidate: Option<u64>,
  #[serde(default)]
  dynamic: bool,
  #[serde(default)]
  resources: Vec<ResourceFile>,
  static_paths: Option<StaticPathsFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourceFile {
  key: String,
  kind: String,
  /// Required payload field; makes the resource primary.
  primary: Option<String>,
  default: Option<Value>,
  #[serde(default)]
  fixed: BTreeMap<String, String>,
  #[serde(default)]
  query: Vec<String>,
  /// Request query key carrying the viewport width, sent on as `device`.
  device_width: Option<String>,
}

/// Prebuilt paths come from a gateway listing: `field` of each item fills
/// route param `param`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct StaticPathsFile {
  kind: String,
  field: String,
  param: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InvalidationFile {
  site_url: String,
  slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SitemapFile {
  #[serde(default)]
  static_paths: Vec<String>,
  #[serde(default)]
  sources: Vec<SourceFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceFile {
  name: String,
  kind: String,
  pattern: String,
  #[serde(default)]
  raw: bool,
  slug_field: String,
  lastmod_field: Option<String>,
  changefreq: Option<ChangeFreq>,
  priority: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RedirectsFile {
  redirects: Vec<RedirectFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RedirectFile {
  from: String,
  to: String,
  #[serde(default)]
  permanent: bool,
}

#[derive(Default)]
pub struct SiteRoutes {
  pub pages: Vec<PageDef>,
  pub sitemap: Option<Sitemap>,
  pub redirects: Vec<RedirectRule>,
  /// Cache key patterns for `site_url` and `slug`; `None` disables the endpoint.
  pub invalidation: Option<(String, String)>,
}

impl SiteRoutes {
  pub fn load(dir: &Path) -> Result<Self> {
    let mut site = Self::default();
    for file in toml_files(dir)? {
      let rel = file
        .strip_prefix(dir)
        .unwrap_or(&file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
      let content = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
      let context = || format!("failed to parse {}", file.display());

      match rel.as_str() {
        INVALIDATION_FILE => {
          let inv: InvalidationFile = toml::from_str(&content).with_context(context)?;
          site.invalidation = Some((inv.site_url, inv.slug));
        }
        SITEMAP_FILE => {
          let sitemap: SitemapFile = toml::from_str(&content).with_context(context)?;
          site.sitemap = Some(build_sitemap(sitemap));
        }
        REDIRECTS_FILE => {
          let rules: RedirectsFile = toml::from_str(&content).with_context(context)?;
          let rules =
            rules.redirects.into_iter().map(|r| RedirectRule::new(&r.from, r.to, r.permanent));
          site.redirects.extend(rules);
        }
        _ => {
          let page: PageFile = toml::from_str(&content).with_context(context)?;
          site.pages.push(build_page(page).with_context(context)?);
        }
      }
    }
    if site.pages.is_empty() {
      bail!("no page routes found in {}", dir.display());
    }
    tracing::debug!(
      pages = site.pages.len(),
      redirects = site.redirects.len(),
      sitemap = site.sitemap.is_some(),
      invalidation = site.invalidation.is_some(),
      "route files loaded"
    );
    Ok(site)
  }

  pub fn apply(self, mut server: HeraldServer) -> HeraldServer {
    for page in self.pages {
      server = server.page(page);
    }
    if let Some(sitemap) = self.sitemap {
      server = server.sitemap(sitemap);
    }
    for rule in self.redirects {
      server = server.redirect(rule);
    }
    if let Some((site_url, slug)) = self.invalidation {
      server = server.invalidation_keys(site_url, slug);
    }
    server
  }
}

fn build_page(file: PageFile) -> Result<PageDef> {
  let revalidate = match (file.dynamic, file.revalidate) {
    (true, Some(_)) => bail!("route {} is dynamic and also sets revalidate", file.name),
    (true, None) => Some(Revalidate::Dynamic),
    (false, secs) => secs.map(Revalidate::seconds),
  };
  if file.dynamic && file.static_paths.is_some() {
    bail!("route {} is dynamic and cannot list static paths", file.name);
  }

  let mut template = RouteTemplate::new(file.name, &file.pattern);
  for param in file.raw_params {
    template = template.raw_param(param);
  }
  if let Fallback::NotFound = file.fallback {
    template = template.fallback(FallbackMode::NotFound);
  }
  if let Some(revalidate) = revalidate {
    template = template.revalidate(revalidate);
  }

  let mut page = PageDef::new(template);
  for res in file.resources {
    let mut spec = match res.primary {
      Some(field) => ResourceSpec::primary(res.key, res.kind, field),
      None => ResourceSpec::auxiliary(res.key, res.kind, res.default.unwrap_or(Value::Null)),
    };
    for (key, value) in res.fixed {
      spec = spec.fixed(key, value);
    }
    for key in res.query {
      spec = spec.forward_query(key);
    }
    if let Some(key) = res.device_width {
      spec = spec.customize(move |params, req| {
        let width = params.query(&key).and_then(|w| w.parse().ok());
        req.query("device", device_bucket(width))
      });
    }
    page = page.resource(spec);
  }

  if let Some(paths) = file.static_paths {
    page = page.static_paths(move |gateway| {
      let paths = paths.clone();
      async move {
        let listing = gateway.fetch(ResourceRequest::new(paths.kind.clone())).await?;
        Ok::<_, GatewayError>(param_sets(&listing, &paths.field, &paths.param))
      }
      .boxed()
    });
  }
  Ok(page)
}

/// One param set per listing item that carries a string `field`.
fn param_sets(listing: &Value, field: &str, param: &str) -> Vec<BTreeMap<String, String>> {
  listing_items(listing)
    .iter()
    .filter_map(|item| item.get(field).and_then(Value::as_str))
    .map(|value| BTreeMap::from([(param.to_string(), value.to_string())]))
    .collect()
}

fn build_sitemap(file: SitemapFile) -> Sitemap {
  let mut sitemap = Sitemap::new();
  for path in file.static_paths {
    sitemap = sitemap.static_path(path);
  }
  for src in file.sources {
    let mut template = RouteTemplate::new(src.name.clone(), &src.pattern);
    if src.raw {
      for param in template.params.clone() {
        template = template.raw_param(param);
      }
    }
    let mut source = SitemapSource::new(src.name, src.kind, template, src.slug_field);
    if let Some(field) = src.lastmod_field {
      source = source.lastmod_field(field);
    }
    if let Some(freq) = src.changefreq {
      source = source.changefreq(freq);
    }
    if let Some(priority) = src.priority {
      source = source.priority(priority);
    }
    sitemap = sitemap.source(source);
  }
  sitemap
}

fn toml_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
  let mut files = Vec::new();
  let mut pending = vec![dir.to_path_buf()];
  while let Some(current) = pending.pop() {
    let entries =
      std::fs::read_dir(&current).with_context(|| format!("failed to read {}", current.display()))?;
    for entry in entries {
      let path = entry?.path();
      if path.is_dir() {
        pending.push(path);
      } else if path.extension().is_some_and(|ext| ext == "toml") {
        files.push(path);
      }
    }
  }
  files.sort();
  Ok(files)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use std::collections::HashMap;

  use herald_server::{Gateway, RouteParams, StaticGateway};
  use serde_json::json;

  use super::*;

  fn routes_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("routes")
  }

  #[test]
  fn banner_request_carries_device_bucket() {
    let site = SiteRoutes::load(&routes_dir()).unwrap();
    let search = site.pages.iter().find(|p| p.template.name == "search").unwrap();
    let banner = search.resources.iter().find(|r| r.data_key == "banner").unwrap();

    for (width, bucket) in [(Some("375"), "mobile"), (Some("1440"), "desktop"), (None, "desktop")] {
      let query: HashMap<String, String> =
        width.map(|w| ("w".to_string(), w.to_string())).into_iter().collect();
      let params = RouteParams::resolve(&search.template, &HashMap::new(), &query).unwrap();
      assert_eq!(banner.request(&params).query["device"], bucket, "{width:?}");
    }
  }

  #[test]
  fn loads_bundled_routes() {
    let site = SiteRoutes::load(&routes_dir()).unwrap();
    let mut names: Vec<&str> = site.pages.iter().map(|p| p.template.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(
      names,
      ["blog", "blogs", "category", "home", "partner", "partners", "post", "search"]
    );
    assert_eq!(site.redirects.len(), 3);
    assert!(site.sitemap.is_some());
    assert_eq!(site.invalidation, Some(("/{site_url}".into(), "/post/{slug}".into())));

    let search = site.pages.iter().find(|p| p.template.name == "search").unwrap();
    assert!(search.template.revalidate.is_dynamic());
    let blog = site.pages.iter().find(|p| p.template.name == "blog").unwrap();
    assert_eq!(blog.template.fallback, FallbackMode::NotFound);
    assert!(blog.template.is_raw("slug"));
  }

  #[test]
  fn server_only_files_are_optional() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(routes_dir().join("post.toml"), dir.path().join("post.toml")).unwrap();
    // As left by the export pass: directive stripped, server-only files gone.
    let stripped = std::fs::read_to_string(dir.path().join("post.toml"))
      .unwrap()
      .replace("revalidate = 60\n", "");
    std::fs::write(dir.path().join("post.toml"), stripped).unwrap();

    let site = SiteRoutes::load(dir.path()).unwrap();
    assert_eq!(site.pages.len(), 1);
    assert!(site.sitemap.is_none() && site.redirects.is_empty() && site.invalidation.is_none());
  }

  #[test]
  fn dynamic_with_ttl_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("bad.toml"),
      "name = \"bad\"\npattern = \"/bad\"\ndynamic = true\nrevalidate = 5\n",
    )
    .unwrap();
    let Err(err) = SiteRoutes::load(dir.path()) else {
      panic!("dynamic route with a TTL was accepted");
    };
    assert!(format!("{err:#}").contains("dynamic and also sets revalidate"), "{err:#}");
  }

  #[tokio::test]
  async fn static_paths_come_from_listing() {
    let site = SiteRoutes::load(&routes_dir()).unwrap();
    let blog = site.pages.into_iter().find(|p| p.template.name == "blog").unwrap();
    let gateway: Arc<dyn Gateway> = Arc::new(StaticGateway::new().value(
      "blogs",
      json!({"data": [{"slug": "first"}, {"title": "no slug"}, {"slug": "second"}]}),
    ));
    let load = blog.static_paths.unwrap();
    let sets = load(gateway).await.unwrap();
    let slugs: Vec<&str> = sets.iter().map(|s| s["slug"].as_str()).collect();
    assert_eq!(slugs, ["first", "second"]);
  }
}
