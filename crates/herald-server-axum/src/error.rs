/* crates/herald-server-axum/src/error.rs */

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use herald_server::HeraldError;

/// Newtype so `HeraldError` can implement `IntoResponse`; both types are
/// foreign to this crate otherwise.
pub(crate) struct AxumError(pub HeraldError);

impl IntoResponse for AxumError {
  fn into_response(self) -> Response {
    let err = self.0;
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
      tracing::error!(code = err.code(), message = err.message(), "request failed");
    }
    let body = serde_json::json!({
      "message": err.message(),
      "code": err.code(),
    });
    (status, axum::Json(body)).into_response()
  }
}

impl From<HeraldError> for AxumError {
  fn from(err: HeraldError) -> Self {
    Self(err)
  }
}
