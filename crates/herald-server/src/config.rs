/* crates/herald-server/src/config.rs */

use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::errors::HeraldError;

pub const DEFAULT_SITE_URL: &str = "http://localhost:3000";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DATA_ID: &str = "__HERALD_DATA__";

/// Process configuration read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeraldConfig {
  /// Canonical base URL for absolute links and sitemaps (`NEXT_PUBLIC_SITE_URL`).
  pub site_url: String,
  /// Invalidation credential (`REVALIDATE_SECRET`). Unset disables invalidation.
  pub revalidate_secret: Option<String>,
  pub port: u16,
  /// Static export build (`NEXT_EXPORT`): TTL directives are omitted.
  pub export_mode: bool,
  pub api_url: Option<String>,
  pub api_timeout: Duration,
  pub data_id: String,
  pub analytics_id: Option<String>,
  pub site_name: String,
  /// Most on-demand pages held in the cache (`HERALD_CACHE_CAPACITY`).
  pub cache_capacity: usize,
}

impl Default for HeraldConfig {
  fn default() -> Self {
    Self {
      site_url: DEFAULT_SITE_URL.to_string(),
      revalidate_secret: None,
      port: DEFAULT_PORT,
      export_mode: false,
      api_url: None,
      api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
      data_id: DEFAULT_DATA_ID.to_string(),
      analytics_id: None,
      site_name: "Herald".to_string(),
      cache_capacity: DEFAULT_CAPACITY,
    }
  }
}

/// `1`, `true` and `yes` (any case) are truthy; everything else is not.
pub fn is_truthy(value: &str) -> bool {
  matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl HeraldConfig {
  pub fn from_env() -> Result<Self, HeraldError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build from an arbitrary variable source. Blank values count as unset.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, HeraldError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let mut config = Self::default();

    if let Some(url) = get("NEXT_PUBLIC_SITE_URL") {
      if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(HeraldError::validation(format!(
          "NEXT_PUBLIC_SITE_URL must be an absolute http(s) URL, got '{url}'"
        )));
      }
      config.site_url = url.trim_end_matches('/').to_string();
    }
    config.revalidate_secret = get("REVALIDATE_SECRET");
    if let Some(port) = get("PORT") {
      config.port = port
        .parse()
        .map_err(|_| HeraldError::validation(format!("PORT must be a port number, got '{port}'")))?;
    }
    config.export_mode = get("NEXT_EXPORT").is_some_and(|v| is_truthy(&v));
    config.api_url = get("API_URL");
    if let Some(secs) = get("API_TIMEOUT_SECS") {
      let secs: u64 = secs.parse().map_err(|_| {
        HeraldError::validation(format!("API_TIMEOUT_SECS must be whole seconds, got '{secs}'"))
      })?;
      config.api_timeout = Duration::from_secs(secs.max(1));
    }
    if let Some(id) = get("HERALD_DATA_ID") {
      config.data_id = id;
    }
    config.analytics_id = get("ANALYTICS_ID");
    if let Some(name) = get("SITE_NAME") {
      config.site_name = name;
    }
    if let Some(capacity) = get("HERALD_CACHE_CAPACITY") {
      config.cache_capacity = capacity.parse().ok().filter(|n| *n > 0).ok_or_else(|| {
        HeraldError::validation(format!(
          "HERALD_CACHE_CAPACITY must be a positive page count, got '{capacity}'"
        ))
      })?;
    }
    Ok(config)
  }

  pub fn bind_addr(&self) -> String {
    format!("0.0.0.0:{}", self.port)
  }
}
