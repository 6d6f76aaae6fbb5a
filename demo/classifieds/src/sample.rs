/* demo/classifieds/src/sample.rs */

// Offline data set used when API_URL is unset.

use herald_server::{GatewayError, ResourceRequest, StaticGateway, slug};
use serde_json::{Value, json};

fn posts() -> Value {
  json!([
    {"slug": "red-dress-1042", "title": "Red summer dress", "category": "Fashion",
     "city": "Paris", "updated_at": "2026-09-30"},
    {"slug": "mountain-bike-977", "title": "Mountain bike, 21 gears", "category": "Sports",
     "city": "Lyon", "updated_at": "2026-10-02"},
    {"slug": "studio-flat-315", "title": "Studio flat near the station", "category": "Real Estate",
     "city": "Paris", "updated_at": "2026-10-11"},
  ])
}

fn blogs() -> Value {
  json!([
    {"slug": "selling-safely", "title": "Selling safely online", "published_at": "2026-06-01",
     "body": "Meet in public places and never pay in advance."},
    {"slug": "great-photos", "title": "Taking great listing photos", "published_at": "2026-08-15",
     "body": "Natural light beats any filter."},
  ])
}

fn not_found(req: &ResourceRequest) -> GatewayError {
  GatewayError::Status { url: format!("sample://{}", req.kind), status: 404 }
}

fn find(list: &Value, field: &str, wanted: &str) -> Option<Value> {
  list.as_array()?.iter().find(|item| item[field].as_str() == Some(wanted)).cloned()
}

fn param<'a>(req: &'a ResourceRequest, key: &str) -> &'a str {
  req.params.get(key).map_or("", String::as_str)
}

pub fn sample_gateway() -> StaticGateway {
  StaticGateway::new()
    .resource("seo", |req| {
      let title = match param(req, "page") {
        "home" => "Free classified ads",
        "partners" => "Our partners",
        "blogs" => "Tips and guides",
        "search" => "Search ads",
        _ => return Err(not_found(req)),
      };
      Ok(json!({"title": title, "description": format!("{title} near you."),
                "keywords": ["classifieds", "ads"]}))
    })
    .value(
      "categories",
      json!([{"name": "Fashion"}, {"name": "Sports"}, {"name": "Real Estate"}]),
    )
    .value("latest_posts", posts())
    .value("posts", posts())
    .resource("category_seo", |req| {
      let category = param(req, "category");
      let known = json!([{"name": "Fashion"}, {"name": "Sports"}, {"name": "Real Estate"}]);
      find(&known, "name", category)
        .map(|_| {
          json!({
            "title": format!("{category} ads"),
            "canonical": format!("/category/{}", slug::encode(category)),
          })
        })
        .ok_or_else(|| not_found(req))
    })
    .resource("category_posts", |req| {
      let category = param(req, "category");
      let all = posts();
      let items = all.as_array().into_iter().flatten().filter(|p| p["category"] == category);
      Ok(Value::Array(items.cloned().collect()))
    })
    .resource("post", |req| {
      find(&posts(), "slug", param(req, "slug")).ok_or_else(|| not_found(req))
    })
    .resource("related_posts", |req| {
      let slug = param(req, "slug");
      let all = posts();
      let items = all.as_array().into_iter().flatten().filter(|p| p["slug"] != slug);
      Ok(Value::Array(items.take(2).cloned().collect()))
    })
    .value("partners", json!([{"name": "Quick Movers"}, {"name": "Photo Studio"}]))
    .resource("partner", |req| {
      let name = param(req, "partner");
      find(&json!([{"name": "Quick Movers"}, {"name": "Photo Studio"}]), "name", name)
        .ok_or_else(|| not_found(req))
    })
    .value("blogs", blogs())
    .resource("blog", |req| {
      find(&blogs(), "slug", param(req, "slug")).ok_or_else(|| not_found(req))
    })
    .resource("banner", |req| {
      let device = req.query.get("device").map_or("desktop", String::as_str);
      Ok(json!({"image": format!("/static/banner-{device}.png")}))
    })
    .resource("search", |req| {
      let q = req.query.get("q").map(|q| q.to_lowercase()).unwrap_or_default();
      let items = posts()
        .as_array()
        .into_iter()
        .flatten()
        .filter(|p| p["title"].as_str().is_some_and(|t| t.to_lowercase().contains(&q)))
        .cloned()
        .collect();
      Ok(Value::Array(items))
    })
}
