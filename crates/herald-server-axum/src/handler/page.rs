/* crates/herald-server-axum/src/handler/page.rs */

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{MatchedPath, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use herald_server::document::{render_not_found, render_page};
use herald_server::{HeraldError, PageResult, Revalidate};

use super::AppState;
use crate::error::AxumError;

const NO_STORE: &str = "private, no-cache, no-store, max-age=0, must-revalidate";

pub(crate) async fn handle_page(
  State(state): State<Arc<AppState>>,
  matched: MatchedPath,
  uri: Uri,
  Path(params): Path<HashMap<String, String>>,
  Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AxumError> {
  serve(&state, matched.as_str(), &uri, params, query).await
}

pub(crate) async fn handle_static_page(
  State(state): State<Arc<AppState>>,
  matched: MatchedPath,
  uri: Uri,
  Query(query): Query<HashMap<String, String>>,
) -> Result<Response, AxumError> {
  serve(&state, matched.as_str(), &uri, HashMap::new(), query).await
}

pub(crate) async fn handle_not_found(State(state): State<Arc<AppState>>) -> Response {
  not_found(&state)
}

async fn serve(
  state: &AppState,
  pattern: &str,
  uri: &Uri,
  raw_params: HashMap<String, String>,
  query: HashMap<String, String>,
) -> Result<Response, AxumError> {
  let page = state
    .pages
    .get(pattern)
    .ok_or_else(|| HeraldError::internal(format!("no page registered for {pattern}")))?;
  let path = uri.path();
  let config = &state.parts.config;

  let result = state.parts.render(page, path, raw_params, query).await;
  let response = match &*result {
    PageResult::Ok { props, revalidate } => {
      let html = render_page(page, props, path, config);
      let value = cache_control(*revalidate, config.export_mode);
      with_cache_control(Html(html).into_response(), &value)
    }
    PageResult::NotFound => not_found(state),
    PageResult::Redirect { target, permanent: true } => Redirect::permanent(target).into_response(),
    PageResult::Redirect { target, permanent: false } => {
      Redirect::temporary(target).into_response()
    }
    PageResult::ServerError { fallback_props } => {
      let html = render_page(page, fallback_props, path, config);
      let resp = (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response();
      with_cache_control(resp, NO_STORE)
    }
  };
  Ok(response)
}

fn cache_control(revalidate: Revalidate, export_mode: bool) -> String {
  match revalidate.effective(export_mode) {
    Some(ttl) => format!("s-maxage={}, stale-while-revalidate", ttl.as_secs()),
    None if revalidate.is_dynamic() => NO_STORE.to_string(),
    // Exported pages never regenerate.
    None => "public, max-age=0, must-revalidate".to_string(),
  }
}

fn with_cache_control(mut resp: Response, value: &str) -> Response {
  if let Ok(value) = HeaderValue::from_str(value) {
    resp.headers_mut().insert(header::CACHE_CONTROL, value);
  }
  resp
}

fn not_found(state: &AppState) -> Response {
  let html = render_not_found(&state.parts.config);
  (StatusCode::NOT_FOUND, Html(html)).into_response()
}
