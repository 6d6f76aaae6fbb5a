/* crates/herald-server/src/materialize.rs */

//! Turns a route request into a `PageResult`.
//!
//! All resources of a page are fetched concurrently. Auxiliary failures are
//! absorbed into per-field defaults; only the primary resource decides
//! whether the entity exists. Faults outside the individually handled calls
//! (a panicking task, a failing shape hook) still produce a page: defaults
//! for cached templates, `ServerError` for dynamic ones.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::task::JoinSet;

use crate::errors::HeraldError;
use crate::gateway::{Gateway, GatewayError};
use crate::page::{PageDef, PageResult, Props, ResourceRole, RouteParams};

#[derive(Clone)]
pub struct Materializer {
  gateway: Arc<dyn Gateway>,
}

impl Materializer {
  pub fn new(gateway: Arc<dyn Gateway>) -> Self {
    Self { gateway }
  }

  pub fn gateway(&self) -> Arc<dyn Gateway> {
    self.gateway.clone()
  }

  pub async fn materialize(
    &self,
    page: &PageDef,
    raw_params: &HashMap<String, String>,
    query: &HashMap<String, String>,
  ) -> PageResult {
    let Some(params) = RouteParams::resolve(&page.template, raw_params, query) else {
      tracing::debug!(route = %page.template.name, "missing route param");
      return PageResult::NotFound;
    };

    // Request hooks and the shape hook run inline; a panic in either is a
    // fault like any other.
    match AssertUnwindSafe(self.gather(page, &params)).catch_unwind().await {
      Ok(Ok(result)) => result,
      Ok(Err(fault)) => {
        tracing::error!(route = %page.template.name, error = %fault, "page materialization fault");
        fallback(page)
      }
      Err(_) => {
        tracing::error!(route = %page.template.name, "page materialization panicked");
        fallback(page)
      }
    }
  }

  async fn gather(&self, page: &PageDef, params: &RouteParams) -> Result<PageResult, HeraldError> {
    let outcomes = self.fetch_all(page, params).await?;

    let mut props = Props::new();
    for (spec, outcome) in page.resources.iter().zip(outcomes) {
      match (&spec.role, outcome) {
        (ResourceRole::Primary { required_field }, Ok(value)) => {
          if let Some(redirect) = redirect_of(&value) {
            return Ok(redirect);
          }
          if !has_required_field(&value, required_field) {
            tracing::debug!(
              route = %page.template.name,
              resource = %spec.kind,
              field = %required_field,
              "primary resource incomplete"
            );
            return Ok(PageResult::NotFound);
          }
          props.insert(spec.data_key.clone(), value);
        }
        (ResourceRole::Primary { .. }, Err(e)) => {
          tracing::warn!(
            route = %page.template.name,
            resource = %spec.kind,
            error = %e,
            "primary resource unavailable"
          );
          return Ok(PageResult::NotFound);
        }
        (ResourceRole::Auxiliary, Ok(Value::Null)) => {
          props.insert(spec.data_key.clone(), spec.default.clone());
        }
        (ResourceRole::Auxiliary, Ok(value)) => {
          props.insert(spec.data_key.clone(), value);
        }
        (ResourceRole::Auxiliary, Err(e)) => {
          tracing::warn!(
            route = %page.template.name,
            resource = %spec.kind,
            error = %e,
            "auxiliary resource degraded to default"
          );
          props.insert(spec.data_key.clone(), spec.default.clone());
        }
      }
    }

    if let Some(shape) = &page.shape {
      props = shape(props, params)?;
      // The hook may drop keys; the renderer must still see every one.
      for spec in &page.resources {
        props.entry(spec.data_key.clone()).or_insert_with(|| spec.default.clone());
      }
    }

    Ok(PageResult::Ok { props, revalidate: page.template.revalidate })
  }

  /// Fan out every resource request and wait for all of them to settle.
  /// Results come back in declaration order.
  async fn fetch_all(
    &self,
    page: &PageDef,
    params: &RouteParams,
  ) -> Result<Vec<Result<Value, GatewayError>>, HeraldError> {
    let mut join_set = JoinSet::new();
    for (idx, spec) in page.resources.iter().enumerate() {
      let fut = self.gateway.fetch(spec.request(params));
      join_set.spawn(async move { (idx, fut.await) });
    }

    let mut slots: Vec<Option<Result<Value, GatewayError>>> =
      (0..page.resources.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
      let (idx, outcome) = joined.map_err(|e| HeraldError::internal(e.to_string()))?; // task panic
      slots[idx] = Some(outcome);
    }

    slots
      .into_iter()
      .map(|slot| slot.ok_or_else(|| HeraldError::internal("resource task vanished")))
      .collect()
  }
}

/// All-default page used when materialization faults.
fn fallback(page: &PageDef) -> PageResult {
  let props = page.default_props();
  if page.template.revalidate.is_dynamic() {
    PageResult::ServerError { fallback_props: props }
  } else {
    PageResult::Ok { props, revalidate: page.template.revalidate }
  }
}

fn has_required_field(value: &Value, field: &str) -> bool {
  let Some(obj) = value.as_object() else {
    return false;
  };
  match obj.get(field) {
    None | Some(Value::Null) => false,
    Some(Value::String(s)) => !s.trim().is_empty(),
    Some(_) => true,
  }
}

/// A primary payload may ask for a redirect:
/// `{"redirect": {"destination": "/x", "permanent": true}}`.
fn redirect_of(value: &Value) -> Option<PageResult> {
  let redirect = value.get("redirect")?.as_object()?;
  let target = redirect.get("destination")?.as_str()?.to_string();
  let permanent = redirect.get("permanent").and_then(Value::as_bool).unwrap_or(false);
  Some(PageResult::Redirect { target, permanent })
}
