/* crates/herald-server/src/seo.rs */

//! Reconciles page metadata into a document head.
//!
//! `SeoSync` is idempotent: syncing the same `SeoMeta` twice leaves the head
//! exactly as one sync did. Tags are updated in place when present and
//! appended otherwise; empty fields are skipped. The analytics snippet is
//! inserted at most once per document, keyed by a marker id.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::escape::escape_html;

pub const ANALYTICS_MARKER: &str = "herald-analytics";
const ANALYTICS_INIT: &str = "herald-analytics-init";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoMeta {
  pub title: String,
  pub description: String,
  pub keywords: String,
  pub canonical: String,
  pub robots: String,
  pub og_title: String,
  pub og_description: String,
  pub og_image: String,
  pub og_url: String,
  pub og_type: String,
  pub twitter_card: String,
  pub twitter_site: String,
  pub analytics_id: String,
}

/// Accepted source keys per field, first match wins.
const FIELD_KEYS: &[(&str, &[&str])] = &[
  ("title", &["title", "meta_title", "seo_title"]),
  ("description", &["description", "meta_description", "seo_description"]),
  ("keywords", &["keywords", "meta_keywords"]),
  ("canonical", &["canonical", "canonical_url"]),
  ("robots", &["robots"]),
  ("og_title", &["og_title"]),
  ("og_description", &["og_description"]),
  ("og_image", &["og_image", "image"]),
  ("og_url", &["og_url"]),
  ("og_type", &["og_type"]),
  ("twitter_card", &["twitter_card"]),
  ("twitter_site", &["twitter_site"]),
  ("analytics_id", &["analytics_id"]),
];

impl SeoMeta {
  /// Lenient extraction from a primary resource payload. Non-string values
  /// are ignored; a keyword array is joined with ", ".
  pub fn from_value(value: &Value) -> Self {
    let mut meta = Self::default();
    let Some(obj) = value.as_object() else {
      return meta;
    };
    for (field, keys) in FIELD_KEYS {
      let found = keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Array(items)) => {
          let joined =
            items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(", ");
          (!joined.is_empty()).then_some(joined)
        }
        _ => None,
      });
      if let Some(v) = found {
        *meta.field_mut(field) = v;
      }
    }
    meta
  }

  fn field(&self, field: &str) -> &str {
    match field {
      "title" => &self.title,
      "description" => &self.description,
      "keywords" => &self.keywords,
      "canonical" => &self.canonical,
      "robots" => &self.robots,
      "og_title" => &self.og_title,
      "og_description" => &self.og_description,
      "og_image" => &self.og_image,
      "og_url" => &self.og_url,
      "og_type" => &self.og_type,
      "twitter_card" => &self.twitter_card,
      "twitter_site" => &self.twitter_site,
      _ => &self.analytics_id,
    }
  }

  fn field_mut(&mut self, field: &str) -> &mut String {
    match field {
      "title" => &mut self.title,
      "description" => &mut self.description,
      "keywords" => &mut self.keywords,
      "canonical" => &mut self.canonical,
      "robots" => &mut self.robots,
      "og_title" => &mut self.og_title,
      "og_description" => &mut self.og_description,
      "og_image" => &mut self.og_image,
      "og_url" => &mut self.og_url,
      "og_type" => &mut self.og_type,
      "twitter_card" => &mut self.twitter_card,
      "twitter_site" => &mut self.twitter_site,
      _ => &mut self.analytics_id,
    }
  }

  /// Fill blanks from `fallback` without overwriting anything already set.
  pub fn or(mut self, fallback: &SeoMeta) -> Self {
    for (field, _) in FIELD_KEYS {
      let mine = self.field_mut(field);
      if mine.is_empty() {
        fallback.field(field).clone_into(mine);
      }
    }
    self
  }

  /// (attr, key, value) for every meta tag this record produces.
  /// Social fields fall back to the plain title and description.
  fn meta_tags(&self) -> Vec<(MetaAttr, &'static str, &str)> {
    let og_title = first_set(&self.og_title, &self.title);
    let og_description = first_set(&self.og_description, &self.description);
    let og_url = first_set(&self.og_url, &self.canonical);
    vec![
      (MetaAttr::Name, "description", self.description.as_str()),
      (MetaAttr::Name, "keywords", self.keywords.as_str()),
      (MetaAttr::Name, "robots", self.robots.as_str()),
      (MetaAttr::Property, "og:title", og_title),
      (MetaAttr::Property, "og:description", og_description),
      (MetaAttr::Property, "og:image", self.og_image.as_str()),
      (MetaAttr::Property, "og:url", og_url),
      (MetaAttr::Property, "og:type", self.og_type.as_str()),
      (MetaAttr::Name, "twitter:card", self.twitter_card.as_str()),
      (MetaAttr::Name, "twitter:site", self.twitter_site.as_str()),
      (MetaAttr::Name, "twitter:title", og_title),
      (MetaAttr::Name, "twitter:description", og_description),
      (MetaAttr::Name, "twitter:image", self.og_image.as_str()),
    ]
  }
}

fn first_set<'a>(a: &'a str, b: &'a str) -> &'a str {
  if a.is_empty() { b } else { a }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaAttr {
  Name,
  Property,
}

impl MetaAttr {
  fn as_str(self) -> &'static str {
    match self {
      Self::Name => "name",
      Self::Property => "property",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadTag {
  Title(String),
  Meta { attr: MetaAttr, key: String, content: String },
  Link { rel: String, href: String },
  Script { id: Option<String>, src: Option<String>, body: String },
}

/// The ordered tag list of a document head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadDocument {
  tags: Vec<HeadTag>,
}

impl HeadDocument {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn tags(&self) -> &[HeadTag] {
    &self.tags
  }

  pub fn push(&mut self, tag: HeadTag) {
    self.tags.push(tag);
  }

  pub fn title(&self) -> Option<&str> {
    self.tags.iter().find_map(|t| match t {
      HeadTag::Title(s) => Some(s.as_str()),
      _ => None,
    })
  }

  pub fn meta(&self, attr: MetaAttr, key: &str) -> Option<&str> {
    self.tags.iter().find_map(|t| match t {
      HeadTag::Meta { attr: a, key: k, content } if *a == attr && k == key => {
        Some(content.as_str())
      }
      _ => None,
    })
  }

  pub fn has_script(&self, id: &str) -> bool {
    self.tags.iter().any(|t| matches!(t, HeadTag::Script { id: Some(i), .. } if i == id))
  }

  /// Returns true when the document changed.
  fn upsert(&mut self, tag: HeadTag) -> bool {
    let slot = self.tags.iter_mut().find(|existing| same_slot(existing, &tag));
    match slot {
      Some(existing) if *existing == tag => false,
      Some(existing) => {
        *existing = tag;
        true
      }
      None => {
        self.tags.push(tag);
        true
      }
    }
  }

  pub fn render(&self) -> String {
    let mut out = String::new();
    for tag in &self.tags {
      match tag {
        HeadTag::Title(t) => {
          out.push_str(&format!("<title>{}</title>", escape_html(t)));
        }
        HeadTag::Meta { attr, key, content } => {
          out.push_str(&format!(
            r#"<meta {}="{}" content="{}">"#,
            attr.as_str(),
            escape_html(key),
            escape_html(content)
          ));
        }
        HeadTag::Link { rel, href } => {
          out.push_str(&format!(
            r#"<link rel="{}" href="{}">"#,
            escape_html(rel),
            escape_html(href)
          ));
        }
        HeadTag::Script { id, src, body } => {
          out.push_str("<script");
          if let Some(id) = id {
            out.push_str(&format!(r#" id="{}""#, escape_html(id)));
          }
          if let Some(src) = src {
            out.push_str(&format!(r#" async src="{}""#, escape_html(src)));
          }
          out.push('>');
          // Script bodies are generated here from validated ids, never user text.
          out.push_str(body);
          out.push_str("</script>");
        }
      }
      out.push('\n');
    }
    out
  }
}

fn same_slot(a: &HeadTag, b: &HeadTag) -> bool {
  match (a, b) {
    (HeadTag::Title(_), HeadTag::Title(_)) => true,
    (HeadTag::Meta { attr: a1, key: k1, .. }, HeadTag::Meta { attr: a2, key: k2, .. }) => {
      a1 == a2 && k1 == k2
    }
    (HeadTag::Link { rel: r1, .. }, HeadTag::Link { rel: r2, .. }) => r1 == r2,
    (HeadTag::Script { id: Some(i1), .. }, HeadTag::Script { id: Some(i2), .. }) => i1 == i2,
    _ => false,
  }
}

/// Shared client state receiving the current page's metadata.
pub trait SeoStore: Send + Sync {
  fn publish(&self, meta: &SeoMeta);
}

/// In-memory store. Publishing an identical record is not counted as an update.
#[derive(Clone, Default)]
pub struct SharedSeoState {
  inner: Arc<Mutex<(Option<SeoMeta>, usize)>>,
}

impl SharedSeoState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn current(&self) -> Option<SeoMeta> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).0.clone()
  }

  pub fn updates(&self) -> usize {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).1
  }
}

impl SeoStore for SharedSeoState {
  fn publish(&self, meta: &SeoMeta) {
    let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.0.as_ref() != Some(meta) {
      guard.0 = Some(meta.clone());
      guard.1 += 1;
    }
  }
}

#[derive(Clone, Default)]
pub struct SeoSync {
  store: Option<Arc<dyn SeoStore>>,
}

impl SeoSync {
  pub fn new(store: Arc<dyn SeoStore>) -> Self {
    Self { store: Some(store) }
  }

  /// Reconcile `meta` into `doc`. Returns how many tags were added or changed.
  pub fn sync(&self, doc: &mut HeadDocument, meta: &SeoMeta) -> usize {
    let mut changed = 0;

    if !meta.title.is_empty() && doc.upsert(HeadTag::Title(meta.title.clone())) {
      changed += 1;
    }
    for (attr, key, content) in meta.meta_tags() {
      if content.is_empty() {
        continue;
      }
      let tag = HeadTag::Meta { attr, key: key.to_string(), content: content.to_string() };
      if doc.upsert(tag) {
        changed += 1;
      }
    }
    if !meta.canonical.is_empty()
      && doc.upsert(HeadTag::Link { rel: "canonical".into(), href: meta.canonical.clone() })
    {
      changed += 1;
    }
    changed += insert_analytics(doc, &meta.analytics_id);

    if let Some(store) = &self.store {
      store.publish(meta);
    }
    changed
  }
}

fn valid_analytics_id(id: &str) -> bool {
  !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn insert_analytics(doc: &mut HeadDocument, id: &str) -> usize {
  if id.is_empty() || doc.has_script(ANALYTICS_MARKER) {
    return 0;
  }
  if !valid_analytics_id(id) {
    tracing::warn!(analytics_id = %id, "ignoring malformed analytics id");
    return 0;
  }
  doc.push(HeadTag::Script {
    id: Some(ANALYTICS_MARKER.into()),
    src: Some(format!("https://www.googletagmanager.com/gtag/js?id={id}")),
    body: String::new(),
  });
  doc.push(HeadTag::Script {
    id: Some(ANALYTICS_INIT.into()),
    src: None,
    body: format!(
      "window.dataLayer=window.dataLayer||[];\
       function gtag(){{dataLayer.push(arguments);}}\
       gtag('js',new Date());gtag('config','{id}');"
    ),
  });
  2
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn meta() -> SeoMeta {
    SeoMeta {
      title: "Dating in Paris".into(),
      description: "Listings".into(),
      canonical: "https://example.com/paris".into(),
      og_image: "https://cdn.example.com/p.png".into(),
      analytics_id: "G-ABC123".into(),
      ..Default::default()
    }
  }

  #[test]
  fn from_value_reads_aliases() {
    let m = SeoMeta::from_value(&json!({
      "meta_title": "T",
      "meta_description": " D ",
      "keywords": ["a", "b"],
      "image": "i.png",
      "robots": 3
    }));
    assert_eq!(m.title, "T");
    assert_eq!(m.description, "D");
    assert_eq!(m.keywords, "a, b");
    assert_eq!(m.og_image, "i.png");
    assert_eq!(m.robots, "");
    assert_eq!(SeoMeta::from_value(&json!([1, 2])), SeoMeta::default());
  }

  #[test]
  fn or_fills_blanks_only() {
    let base = SeoMeta { title: "Site".into(), robots: "index".into(), ..Default::default() };
    let merged = SeoMeta { title: "Page".into(), ..Default::default() }.or(&base);
    assert_eq!(merged.title, "Page");
    assert_eq!(merged.robots, "index");
  }

  #[test]
  fn sync_twice_equals_once() {
    let store = SharedSeoState::new();
    let sync = SeoSync::new(Arc::new(store.clone()));
    let mut once = HeadDocument::new();
    sync.sync(&mut once, &meta());
    let mut twice = once.clone();
    assert_eq!(sync.sync(&mut twice, &meta()), 0);
    assert_eq!(once, twice);
    assert_eq!(store.updates(), 1);
    assert_eq!(store.current(), Some(meta()));
  }

  #[test]
  fn updates_existing_tags_in_place() {
    let mut doc = HeadDocument::new();
    doc.push(HeadTag::Title("Old".into()));
    doc.push(HeadTag::Meta {
      attr: MetaAttr::Name,
      key: "description".into(),
      content: "old".into(),
    });
    let sync = SeoSync::default();
    sync.sync(&mut doc, &meta());
    let titles = doc.tags().iter().filter(|t| matches!(t, HeadTag::Title(_))).count();
    assert_eq!(titles, 1);
    assert_eq!(doc.title(), Some("Dating in Paris"));
    assert_eq!(doc.meta(MetaAttr::Name, "description"), Some("Listings"));
    assert_eq!(doc.meta(MetaAttr::Property, "og:title"), Some("Dating in Paris"));
    assert_eq!(doc.meta(MetaAttr::Property, "og:url"), Some("https://example.com/paris"));
  }

  #[test]
  fn empty_fields_are_skipped() {
    let mut doc = HeadDocument::new();
    SeoSync::default().sync(&mut doc, &SeoMeta { title: "Only".into(), ..Default::default() });
    assert_eq!(doc.meta(MetaAttr::Name, "keywords"), None);
    assert_eq!(doc.meta(MetaAttr::Name, "description"), None);
    // title, og:title, twitter:title
    assert_eq!(doc.tags().len(), 3);
  }

  #[test]
  fn analytics_inserted_once_per_document() {
    let sync = SeoSync::default();
    let mut doc = HeadDocument::new();
    sync.sync(&mut doc, &meta());
    sync.sync(&mut doc, &SeoMeta { analytics_id: "G-OTHER".into(), ..meta() });
    let scripts = doc.tags().iter().filter(|t| matches!(t, HeadTag::Script { .. })).count();
    assert_eq!(scripts, 2);
    assert!(doc.render().contains("G-ABC123"));
    assert!(!doc.render().contains("G-OTHER"));
  }

  #[test]
  fn malformed_analytics_id_is_ignored() {
    let mut doc = HeadDocument::new();
    SeoSync::default()
      .sync(&mut doc, &SeoMeta { analytics_id: "x');alert(1)//".into(), ..Default::default() });
    assert!(!doc.has_script(ANALYTICS_MARKER));
  }

  #[test]
  fn render_escapes_values() {
    let mut doc = HeadDocument::new();
    SeoSync::default().sync(
      &mut doc,
      &SeoMeta {
        title: "<b>Rock & Roll</b>".into(),
        description: "\"q\"".into(),
        ..Default::default()
      },
    );
    let html = doc.render();
    assert!(html.contains("<title>&lt;b&gt;Rock &amp; Roll&lt;/b&gt;</title>"));
    assert!(html.contains(r#"<meta name="description" content="&quot;q&quot;">"#));
  }
}
