/* crates/herald-server/src/sitemap.rs */

//! XML sitemaps (protocol 0.9) built from paginated gateway listings.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use serde_json::Value;

use crate::escape::escape_xml;
use crate::gateway::{Gateway, GatewayError, ResourceRequest};
use crate::route::RouteTemplate;

const XMLNS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Name of the section listing paths without parameters.
pub const PAGES_SECTION: &str = "pages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFreq {
  Always,
  Hourly,
  Daily,
  Weekly,
  Monthly,
  Yearly,
  Never,
}

impl ChangeFreq {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Always => "always",
      Self::Hourly => "hourly",
      Self::Daily => "daily",
      Self::Weekly => "weekly",
      Self::Monthly => "monthly",
      Self::Yearly => "yearly",
      Self::Never => "never",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
  pub loc: String,
  pub lastmod: Option<NaiveDate>,
  pub changefreq: Option<ChangeFreq>,
  pub priority: Option<f32>,
}

pub fn render_urlset(entries: &[SitemapEntry]) -> String {
  let mut xml = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"{XMLNS}\">");
  for e in entries {
    xml.push_str("<url>");
    let _ = write!(xml, "<loc>{}</loc>", escape_xml(&e.loc));
    if let Some(d) = e.lastmod {
      let _ = write!(xml, "<lastmod>{}</lastmod>", d.format("%Y-%m-%d"));
    }
    if let Some(f) = e.changefreq {
      let _ = write!(xml, "<changefreq>{}</changefreq>", f.as_str());
    }
    if let Some(p) = e.priority {
      let _ = write!(xml, "<priority>{:.1}</priority>", p.clamp(0.0, 1.0));
    }
    xml.push_str("</url>\n");
  }
  xml.push_str("</urlset>\n");
  xml
}

pub fn render_index(locs: &[String], lastmod: NaiveDate) -> String {
  let mut xml =
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<sitemapindex xmlns=\"{XMLNS}\">");
  for loc in locs {
    let _ = writeln!(
      xml,
      "<sitemap><loc>{}</loc><lastmod>{}</lastmod></sitemap>",
      escape_xml(loc),
      lastmod.format("%Y-%m-%d")
    );
  }
  xml.push_str("</sitemapindex>\n");
  xml
}

/// One paginated gateway listing turned into sitemap entries.
#[derive(Debug, Clone)]
pub struct SitemapSource {
  pub name: String,
  pub kind: String,
  /// Filled with the item's `slug_field` under the template's single param.
  pub template: RouteTemplate,
  pub slug_field: String,
  pub lastmod_field: Option<String>,
  pub changefreq: ChangeFreq,
  pub priority: f32,
  pub page_size: usize,
  pub max_pages: usize,
}

impl SitemapSource {
  pub fn new(
    name: impl Into<String>,
    kind: impl Into<String>,
    template: RouteTemplate,
    slug_field: impl Into<String>,
  ) -> Self {
    Self {
      name: name.into(),
      kind: kind.into(),
      template,
      slug_field: slug_field.into(),
      lastmod_field: None,
      changefreq: ChangeFreq::Daily,
      priority: 0.7,
      page_size: 100,
      max_pages: 50,
    }
  }

  pub fn lastmod_field(mut self, field: impl Into<String>) -> Self {
    self.lastmod_field = Some(field.into());
    self
  }

  pub fn changefreq(mut self, freq: ChangeFreq) -> Self {
    self.changefreq = freq;
    self
  }

  pub fn priority(mut self, priority: f32) -> Self {
    self.priority = priority;
    self
  }

  pub fn pages(mut self, page_size: usize, max_pages: usize) -> Self {
    self.page_size = page_size.max(1);
    self.max_pages = max_pages.max(1);
    self
  }

  /// Walk pages 1.. until an empty or short page, or `max_pages`. A failure
  /// on the first page is an error; a later failure truncates the listing.
  pub async fn collect(
    &self,
    gateway: &dyn Gateway,
    site_url: &str,
  ) -> Result<Vec<SitemapEntry>, GatewayError> {
    let mut entries = Vec::new();
    for page in 1..=self.max_pages {
      let req = ResourceRequest::new(self.kind.clone())
        .query("page", page.to_string())
        .query("limit", self.page_size.to_string());
      let payload = match gateway.fetch(req).await {
        Ok(v) => v,
        Err(e) if page == 1 => return Err(e),
        Err(e) => {
          tracing::warn!(
            sitemap = %self.name,
            page,
            error = %e,
            "listing page failed; sitemap truncated"
          );
          break;
        }
      };
      let items = listing_items(&payload);
      let count = items.len();
      entries.extend(items.iter().filter_map(|item| self.entry(item, site_url)));
      if count < self.page_size {
        break;
      }
    }
    Ok(entries)
  }

  fn entry(&self, item: &Value, site_url: &str) -> Option<SitemapEntry> {
    let param = self.template.params.first()?;
    let value = match item.get(&self.slug_field)? {
      Value::String(s) => s.clone(),
      Value::Number(n) => n.to_string(),
      _ => return None,
    };
    let values = BTreeMap::from([(param.clone(), value)]);
    let path = self.template.render_path(&values)?;
    let lastmod = self
      .lastmod_field
      .as_deref()
      .and_then(|f| item.get(f))
      .and_then(Value::as_str)
      .and_then(parse_date);
    Some(SitemapEntry {
      loc: absolute_url(site_url, &path),
      lastmod,
      changefreq: Some(self.changefreq),
      priority: Some(self.priority),
    })
  }
}

/// Listing payloads are either a bare array or an object wrapping one.
pub fn listing_items(payload: &Value) -> &[Value] {
  if let Some(items) = payload.as_array() {
    return items;
  }
  ["data", "items", "results", "posts"]
    .iter()
    .find_map(|k| payload.get(*k).and_then(Value::as_array))
    .map(Vec::as_slice)
    .unwrap_or_default()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.date_naive())
    .ok()
    .or_else(|| NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok())
}

pub fn absolute_url(site_url: &str, path: &str) -> String {
  let base = site_url.trim_end_matches('/');
  if path.starts_with('/') { format!("{base}{path}") } else { format!("{base}/{path}") }
}

/// The complete sitemap set of a site: one static section plus one section
/// per source, tied together by an index.
#[derive(Debug, Clone, Default)]
pub struct Sitemap {
  static_paths: Vec<String>,
  sources: Vec<SitemapSource>,
}

impl Sitemap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn static_path(mut self, path: impl Into<String>) -> Self {
    self.static_paths.push(path.into());
    self
  }

  pub fn source(mut self, source: SitemapSource) -> Self {
    self.sources.push(source);
    self
  }

  pub fn section_names(&self) -> Vec<&str> {
    let mut names = vec![PAGES_SECTION];
    names.extend(self.sources.iter().map(|s| s.name.as_str()));
    names
  }

  pub fn render_index(&self, site_url: &str, today: NaiveDate) -> String {
    let locs: Vec<String> = self
      .section_names()
      .iter()
      .map(|name| absolute_url(site_url, &format!("/sitemaps/{name}.xml")))
      .collect();
    render_index(&locs, today)
  }

  /// `Ok(None)` for an unknown section name.
  pub async fn render_section(
    &self,
    name: &str,
    gateway: &dyn Gateway,
    site_url: &str,
    today: NaiveDate,
  ) -> Result<Option<String>, GatewayError> {
    if name == PAGES_SECTION {
      let entries: Vec<SitemapEntry> = self
        .static_paths
        .iter()
        .map(|p| SitemapEntry {
          loc: absolute_url(site_url, p),
          lastmod: Some(today),
          changefreq: Some(ChangeFreq::Daily),
          priority: Some(if p == "/" { 1.0 } else { 0.8 }),
        })
        .collect();
      return Ok(Some(render_urlset(&entries)));
    }
    let Some(source) = self.sources.iter().find(|s| s.name == name) else {
      return Ok(None);
    };
    let entries = source.collect(gateway, site_url).await?;
    tracing::debug!(sitemap = %name, count = entries.len(), "sitemap section rendered");
    Ok(Some(render_urlset(&entries)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gateway::StaticGateway;
  use serde_json::json;

  fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
  }

  fn posts_source() -> SitemapSource {
    let template = RouteTemplate::new("post", "/post/{slug}").raw_param("slug");
    SitemapSource::new("posts", "posts", template, "slug").lastmod_field("updated_at").pages(2, 10)
  }

  #[test]
  fn urlset_escapes_and_formats() {
    let xml = render_urlset(&[SitemapEntry {
      loc: "https://x.com/a?b=1&c=2".into(),
      lastmod: Some(day()),
      changefreq: Some(ChangeFreq::Weekly),
      priority: Some(0.66),
    }]);
    assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(xml.contains("<loc>https://x.com/a?b=1&amp;c=2</loc>"));
    assert!(xml.contains("<lastmod>2026-03-01</lastmod>"));
    assert!(xml.contains("<changefreq>weekly</changefreq>"));
    assert!(xml.contains("<priority>0.7</priority>"));
  }

  #[test]
  fn index_lists_every_section() {
    let sitemap = Sitemap::new().static_path("/").source(posts_source());
    let xml = sitemap.render_index("https://site.com/", day());
    assert!(xml.contains("<sitemapindex"));
    assert!(xml.contains("<loc>https://site.com/sitemaps/pages.xml</loc>"));
    assert!(xml.contains("<loc>https://site.com/sitemaps/posts.xml</loc>"));
  }

  #[tokio::test]
  async fn collect_walks_pages_until_short_page() {
    let gw = StaticGateway::new().resource("posts", |req| {
      Ok(match req.query["page"].as_str() {
        "1" => json!([{"slug": "a", "updated_at": "2026-01-02T10:00:00Z"}, {"slug": "b"}]),
        "2" => json!({"data": [{"slug": "c", "updated_at": "2026-02-03"}]}),
        _ => json!([]),
      })
    });
    let entries = posts_source().collect(&gw, "https://site.com").await.unwrap();
    let locs: Vec<&str> = entries.iter().map(|e| e.loc.as_str()).collect();
    assert_eq!(
      locs,
      ["https://site.com/post/a", "https://site.com/post/b", "https://site.com/post/c"]
    );
    assert_eq!(entries[0].lastmod, NaiveDate::from_ymd_opt(2026, 1, 2));
    assert_eq!(entries[1].lastmod, None);
    assert_eq!(entries[2].lastmod, NaiveDate::from_ymd_opt(2026, 2, 3));
    assert_eq!(gw.calls(), 2);
  }

  #[tokio::test]
  async fn collect_encodes_display_names() {
    let source = SitemapSource::new(
      "categories",
      "categories",
      RouteTemplate::new("category", "/category/{category}"),
      "name",
    );
    let gw =
      StaticGateway::new().value("categories", json!([{"name": "Massage Parlors"}, {"id": 3}]));
    let entries = source.collect(&gw, "https://site.com").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].loc, "https://site.com/category/massage-parlors");
  }

  #[tokio::test]
  async fn first_page_failure_is_an_error_later_failure_truncates() {
    let down = StaticGateway::new().failing("posts", "down");
    assert!(posts_source().collect(&down, "https://s.com").await.is_err());

    let flaky = StaticGateway::new().resource("posts", |req| match req.query["page"].as_str() {
      "1" => Ok(json!([{"slug": "a"}, {"slug": "b"}])),
      _ => Err(GatewayError::Other("timeout".into())),
    });
    assert_eq!(posts_source().collect(&flaky, "https://s.com").await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn sections_by_name() {
    let sitemap = Sitemap::new().static_path("/").static_path("/partners").source(posts_source());
    let gw = StaticGateway::new().value("posts", json!([]));
    let pages =
      sitemap.render_section("pages", &gw, "https://s.com", day()).await.unwrap().unwrap();
    assert!(pages.contains("<loc>https://s.com/partners</loc>"));
    assert!(pages.contains("<priority>1.0</priority>"));
    assert!(sitemap.render_section("nope", &gw, "https://s.com", day()).await.unwrap().is_none());
  }
}
