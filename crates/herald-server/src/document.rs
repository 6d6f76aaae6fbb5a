/* crates/herald-server/src/document.rs */

//! HTML documents for materialized pages. The props are embedded as JSON in
//! a script tag for client hydration; the head comes from `SeoSync`.

use serde_json::Value;

use crate::config::HeraldConfig;
use crate::escape::{escape_html, escape_json_for_script};
use crate::page::{PageDef, Props};
use crate::seo::{HeadDocument, HeadTag, MetaAttr, SeoMeta, SeoSync};
use crate::sitemap::absolute_url;

const SHELL: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n</head>\n\
<body>\n<div id=\"__herald\"></div>\n</body>\n</html>\n";

/// Build the head for a page: metadata from the primary resource, with the
/// canonical URL and analytics id filled from config when the API left them out.
pub fn page_head(page: &PageDef, props: &Props, path: &str, config: &HeraldConfig) -> HeadDocument {
  let from_api = page
    .seo_key()
    .and_then(|key| props.get(key))
    .map(SeoMeta::from_value)
    .unwrap_or_default();
  let site_defaults = SeoMeta {
    title: config.site_name.clone(),
    canonical: absolute_url(&config.site_url, path),
    analytics_id: config.analytics_id.clone().unwrap_or_default(),
    og_type: "website".into(),
    twitter_card: "summary_large_image".into(),
    ..Default::default()
  };
  let mut head = HeadDocument::new();
  SeoSync::default().sync(&mut head, &from_api.or(&site_defaults));
  head
}

/// Assemble the full document: head tags before `</head>`, the data script
/// before `</body>`.
pub fn render_document(head: &HeadDocument, props: &Props, data_id: &str) -> String {
  let mut html = SHELL.to_string();
  if let Some(pos) = html.find("</head>") {
    html.insert_str(pos, &head.render());
  }
  let json = serde_json::to_string(&Value::Object(props.clone())).unwrap_or_else(|_| "{}".into());
  let script = format!(
    "<script id=\"{}\" type=\"application/json\">{}</script>\n",
    escape_html(data_id),
    escape_json_for_script(&json)
  );
  if let Some(pos) = html.rfind("</body>") {
    html.insert_str(pos, &script);
  } else {
    html.push_str(&script);
  }
  html
}

pub fn render_page(page: &PageDef, props: &Props, path: &str, config: &HeraldConfig) -> String {
  render_document(&page_head(page, props, path, config), props, &config.data_id)
}

/// Branded 404 document.
pub fn render_not_found(config: &HeraldConfig) -> String {
  let mut head = HeadDocument::new();
  head.push(HeadTag::Title(format!("Page not found | {}", config.site_name)));
  head.push(HeadTag::Meta {
    attr: MetaAttr::Name,
    key: "robots".into(),
    content: "noindex".into(),
  });
  let html = render_document(&head, &Props::new(), &config.data_id);
  let body = format!(
    "<main class=\"herald-not-found\"><h1>404</h1><p>This page could not be found.</p>\
<p><a href=\"{}/\">Back to {}</a></p></main>\n",
    escape_html(&config.site_url),
    escape_html(&config.site_name)
  );
  html.replacen("<div id=\"__herald\"></div>\n", &body, 1)
}
