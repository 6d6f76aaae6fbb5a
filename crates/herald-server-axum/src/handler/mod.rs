/* crates/herald-server-axum/src/handler/mod.rs */

mod page;
mod redirect;
mod revalidate;
mod sitemap;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use herald_server::{HeraldParts, PageDef};
use tower_http::trace::TraceLayer;

pub(crate) struct AppState {
  pub parts: HeraldParts,
  /// Axum route pattern -> page
  pub pages: HashMap<String, Arc<PageDef>>,
}

pub(crate) fn build_router(parts: HeraldParts) -> Router {
  let mut pages = HashMap::new();
  let mut router = Router::new().route("/api/revalidate", get(revalidate::handle_revalidate));

  if parts.sitemap.is_some() {
    router = router
      .route("/sitemap.xml", get(sitemap::handle_index))
      .route("/sitemaps/{file}", get(sitemap::handle_section));
  }

  // Templates without params have no Path to extract.
  for page in &parts.pages {
    let pattern = page.template.pattern.clone();
    router = if page.template.is_static() {
      router.route(&pattern, get(page::handle_static_page))
    } else {
      router.route(&pattern, get(page::handle_page))
    };
    pages.insert(pattern, page.clone());
  }

  let state = Arc::new(AppState { parts, pages });

  router
    .fallback(page::handle_not_found)
    .layer(axum::middleware::from_fn_with_state(state.clone(), redirect::apply_redirects))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::sync::Arc;

  use axum::body::Body;
  use axum::http::{Request, StatusCode, header};
  use futures_util::FutureExt;
  use herald_server::{
    FallbackMode, GatewayError, HeraldConfig, HeraldServer, PageDef, RedirectRule, ResourceSpec,
    Revalidate, RouteTemplate, Sitemap, SitemapSource, StaticGateway,
  };
  use http_body_util::BodyExt;
  use serde_json::{Value, json};
  use tower::ServiceExt;

  use super::*;

  fn gateway() -> StaticGateway {
    StaticGateway::new()
      .value("home_seo", json!({"title": "Classifieds", "description": "Free ads"}))
      .resource("post", |req| match req.params["slug"].as_str() {
        "missing" => Err(GatewayError::Status { url: "/posts/missing".into(), status: 404 }),
        "moved" => Ok(json!({"redirect": {"destination": "/post/new-home", "permanent": true}})),
        slug => Ok(json!({"title": format!("Post {slug}")})),
      })
      .failing("related", "upstream down")
      .value("posts", json!([{"slug": "a"}, {"slug": "b"}]))
      .value("search_seo", json!({"title": "Search"}))
  }

  fn parts() -> HeraldParts {
    HeraldServer::new(Arc::new(gateway()))
      .config(HeraldConfig {
        site_url: "https://ads.example.com".into(),
        revalidate_secret: Some("s3cret".into()),
        ..Default::default()
      })
      .redirect(RedirectRule::new("/ads/{slug}", "/post/{slug}", true))
      .sitemap(Sitemap::new().static_path("/").source(SitemapSource::new(
        "posts",
        "posts",
        RouteTemplate::new("post", "/post/{slug}").raw_param("slug"),
        "slug",
      )))
      .page(
        PageDef::new(RouteTemplate::new("home", "/").revalidate(Revalidate::seconds(300)))
          .resource(ResourceSpec::primary("seo", "home_seo", "title")),
      )
      .page(
        PageDef::new(RouteTemplate::new("post", "/post/{slug}").raw_param("slug"))
          .resource(ResourceSpec::primary("post", "post", "title"))
          .resource(ResourceSpec::auxiliary("related", "related", json!([]))),
      )
      .page(
        PageDef::new(
          RouteTemplate::new("blog", "/blog/{slug}").fallback(FallbackMode::NotFound),
        )
        .resource(ResourceSpec::primary("post", "post", "title"))
        .static_paths(|_| {
          let hello = BTreeMap::from([("slug".to_string(), "Hello".to_string())]);
          async move { Ok::<_, GatewayError>(vec![hello]) }.boxed()
        }),
      )
      .page(
        PageDef::new(RouteTemplate::new("search", "/search").revalidate(Revalidate::Dynamic))
          .resource(ResourceSpec::primary("seo", "search_seo", "title"))
          .resource(ResourceSpec::auxiliary("results", "search", json!([])).forward_query("q")),
      )
      .into_parts()
  }

  async fn get(router: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let resp = router
      .clone()
      .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
  }

  #[tokio::test]
  async fn serves_page_with_ttl_header_and_head() {
    let router = build_router(parts());
    let (status, headers, body) = get(&router, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CACHE_CONTROL], "s-maxage=300, stale-while-revalidate");
    assert!(body.contains("<title>Classifieds</title>"));
    assert!(body.contains(r#"<meta name="description" content="Free ads">"#));
    assert!(body.contains(r#"<link rel="canonical" href="https://ads.example.com/">"#));
  }

  #[tokio::test]
  async fn degraded_auxiliary_still_renders() {
    let router = build_router(parts());
    let (status, _, body) = get(&router, "/post/red-dress").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Post red-dress"));
    assert!(body.contains(r#""related":[]"#));
  }

  #[tokio::test]
  async fn missing_primary_is_branded_404() {
    let router = build_router(parts());
    let (status, _, body) = get(&router, "/post/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Page not found"));
    let (status, _, _) = get(&router, "/no/such/route/here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn fail_not_found_route_serves_only_prerendered() {
    let parts = parts();
    parts.prerender().await;
    let router = build_router(parts);
    assert_eq!(get(&router, "/blog/hello").await.0, StatusCode::OK);
    assert_eq!(get(&router, "/blog/other").await.0, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn primary_redirect_and_rule_redirect() {
    let router = build_router(parts());
    let (status, headers, _) = get(&router, "/post/moved").await;
    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/post/new-home");

    let (status, headers, _) = get(&router, "/ads/abc?x=1").await;
    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(headers[header::LOCATION], "/post/abc?x=1");
  }

  #[tokio::test]
  async fn dynamic_page_is_not_cached() {
    let router = build_router(parts());
    let (status, headers, body) = get(&router, "/search?q=bike").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CACHE_CONTROL].to_str().unwrap().contains("no-store"));
    assert!(body.contains("<title>Search</title>"));
  }

  #[tokio::test]
  async fn revalidate_endpoint_statuses() {
    let parts = parts();
    let router = build_router(parts.clone());
    get(&router, "/").await;

    let (status, _, body) = get(&router, "/api/revalidate?secret=nope").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"message": "Invalid secret"}));
    assert!(matches!(parts.cache.state("/"), herald_server::EntryState::Built { .. }));

    let (status, _, body) = get(&router, "/api/revalidate?secret=s3cret&slug=a").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["revalidated"], true);
    assert_eq!(body["keys"], json!(["/", "/post/a"]));
    assert_eq!(parts.cache.state("/"), herald_server::EntryState::Stale { revalidating: false });

    let (status, _, body) = get(&router, "/api/revalidate?secret=s3cret&site_url=x/y/z").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["message"], "Revalidation failed");
    assert_eq!(body["failed"][0]["key"], "/x/y/z");
  }

  #[tokio::test]
  async fn unicode_slug_is_purged_by_decoded_query_value() {
    let parts = parts();
    let router = build_router(parts.clone());
    let (status, _, body) = get(&router, "/post/c%C3%B4te-divoire").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Post côte-divoire"));
    assert!(matches!(
      parts.cache.state("/post/c%C3%B4te-divoire"),
      herald_server::EntryState::Built { .. }
    ));

    let (status, _, body) =
      get(&router, "/api/revalidate?secret=s3cret&slug=c%C3%B4te-divoire").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["keys"], json!(["/", "/post/c%C3%B4te-divoire"]));
    assert_eq!(
      parts.cache.state("/post/c%C3%B4te-divoire"),
      herald_server::EntryState::Stale { revalidating: false }
    );
  }

  #[tokio::test]
  async fn sitemaps_are_xml() {
    let router = build_router(parts());
    let (status, headers, body) = get(&router, "/sitemap.xml").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/xml"));
    assert!(body.contains("<loc>https://ads.example.com/sitemaps/posts.xml</loc>"));

    let (_, _, body) = get(&router, "/sitemaps/posts.xml").await;
    assert!(body.contains("<loc>https://ads.example.com/post/b</loc>"));
    assert_eq!(get(&router, "/sitemaps/nope.xml").await.0, StatusCode::NOT_FOUND);
  }
}
