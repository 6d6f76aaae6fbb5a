/* crates/herald-server-axum/src/handler/redirect.rs */

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use herald_server::resolve_redirect;

use super::AppState;

/// Rewrite rules run before routing; the query string is carried over.
pub(crate) async fn apply_redirects(
  State(state): State<Arc<AppState>>,
  req: Request,
  next: Next,
) -> Response {
  let Some((target, permanent)) = resolve_redirect(&state.parts.redirects, req.uri().path()) else {
    return next.run(req).await;
  };
  let location = match req.uri().query() {
    Some(query) => format!("{target}?{query}"),
    None => target,
  };
  tracing::debug!(from = %req.uri().path(), to = %location, "redirect rule applied");
  if permanent {
    Redirect::permanent(&location).into_response()
  } else {
    Redirect::temporary(&location).into_response()
  }
}
