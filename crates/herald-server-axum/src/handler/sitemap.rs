/* crates/herald-server-axum/src/handler/sitemap.rs */

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use herald_server::HeraldError;

use super::AppState;
use crate::error::AxumError;

const XML: &str = "text/xml; charset=utf-8";

fn today() -> NaiveDate {
  chrono::Utc::now().date_naive()
}

fn xml(body: String) -> Response {
  ([(header::CONTENT_TYPE, XML)], body).into_response()
}

pub(crate) async fn handle_index(
  State(state): State<Arc<AppState>>,
) -> Result<Response, AxumError> {
  let sitemap = state.parts.sitemap.as_ref().ok_or_else(|| HeraldError::not_found("No sitemap"))?;
  Ok(xml(sitemap.render_index(&state.parts.config.site_url, today())))
}

/// `/sitemaps/{name}.xml`; the router cannot match a suffix inside a segment.
pub(crate) async fn handle_section(
  State(state): State<Arc<AppState>>,
  Path(file): Path<String>,
) -> Result<Response, AxumError> {
  let sitemap = state.parts.sitemap.as_ref().ok_or_else(|| HeraldError::not_found("No sitemap"))?;
  let name = file
    .strip_suffix(".xml")
    .ok_or_else(|| HeraldError::not_found(format!("Sitemap {file} not found")))?;
  let gateway = state.parts.gateway();
  let section = sitemap
    .render_section(name, gateway.as_ref(), &state.parts.config.site_url, today())
    .await
    .map_err(|e| HeraldError::from(e).context(format!("sitemap {name}")))?;
  match section {
    Some(body) => Ok(xml(body)),
    None => Err(HeraldError::not_found(format!("Sitemap {file} not found")).into()),
  }
}
