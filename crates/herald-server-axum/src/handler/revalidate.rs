/* crates/herald-server-axum/src/handler/revalidate.rs */

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use herald_server::InvalidationRequest;
use serde_json::json;

use super::AppState;

pub(crate) async fn handle_revalidate(
  State(state): State<Arc<AppState>>,
  Query(query): Query<HashMap<String, String>>,
) -> Response {
  let req = InvalidationRequest::from_query(&query);
  let report = match state.parts.invalidate(&req) {
    Ok(report) => report,
    Err(err) if err.status() == 401 => {
      tracing::warn!("revalidation rejected: invalid secret");
      return (StatusCode::UNAUTHORIZED, Json(json!({"message": err.message()}))).into_response();
    }
    Err(err) => {
      tracing::error!(error = %err.message(), "revalidation failed");
      let body = json!({"message": "Revalidation failed", "error": err.message()});
      return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
    }
  };

  if report.is_complete() {
    return Json(json!({"revalidated": true, "keys": report.revalidated})).into_response();
  }

  let error = report.failed.iter().map(|f| format!("{}: {}", f.key, f.error)).collect::<Vec<_>>();
  tracing::error!(failed = report.failed.len(), "revalidation incomplete");
  let body = json!({
    "message": "Revalidation failed",
    "error": error.join("; "),
    "revalidated": report.revalidated,
    "failed": report.failed,
  });
  (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
