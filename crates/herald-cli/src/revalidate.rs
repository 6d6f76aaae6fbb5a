/* crates/herald-cli/src/revalidate.rs */

// `herald revalidate`: ask a running server to mark pages stale.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Url;
use serde_json::Value;

use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RevalidateArgs {
  pub server: String,
  pub secret: String,
  pub site_url: Option<String>,
  pub slug: Option<String>,
  pub timeout: Duration,
}

pub fn endpoint(args: &RevalidateArgs) -> Result<Url> {
  let base = args.server.trim_end_matches('/');
  let mut params = vec![("secret", args.secret.as_str())];
  if let Some(site_url) = &args.site_url {
    params.push(("site_url", site_url.as_str()));
  }
  if let Some(slug) = &args.slug {
    params.push(("slug", slug.as_str()));
  }
  Url::parse_with_params(&format!("{base}/api/revalidate"), &params)
    .with_context(|| format!("invalid server URL: {}", args.server))
}

pub async fn run_revalidate(args: &RevalidateArgs) -> Result<Value> {
  let url = endpoint(args)?;
  ui::arrow(&format!("revalidating via {}", url.origin().ascii_serialization()));

  let client = reqwest::Client::builder().timeout(args.timeout).build()?;
  let resp = client.get(url).send().await.context("revalidation request failed")?;
  let status = resp.status();
  let body: Value = resp.json().await.context("revalidation response was not JSON")?;

  if !status.is_success() {
    let message = body["message"].as_str().unwrap_or("unknown error");
    bail!("server answered {status}: {message}\n{body:#}");
  }
  if let Some(keys) = body["keys"].as_array() {
    for key in keys.iter().filter_map(Value::as_str) {
      ui::detail(key);
    }
  }
  ui::ok("revalidated");
  Ok(body)
}
