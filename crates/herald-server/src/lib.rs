/* crates/herald-server/src/lib.rs */

pub mod cache;
pub mod config;
pub mod document;
pub mod errors;
pub mod escape;
pub mod export;
pub mod gateway;
pub mod materialize;
pub mod page;
pub mod redirect;
pub mod revalidate;
pub mod route;
pub mod seo;
pub mod server;
pub mod sitemap;
pub mod slug;

// Re-exports for ergonomic use
pub use cache::{EntryState, PageCache, StaleOutcome};
pub use config::HeraldConfig;
pub use errors::{ErrorKind, HeraldError};
pub use export::{ExportReport, export_static};
pub use gateway::{
  BoxFuture, Gateway, GatewayError, HttpGateway, ResourceRequest, StaticGateway, device_bucket,
};
pub use materialize::Materializer;
pub use page::{PageDef, PageResult, Props, ResourceRole, ResourceSpec, RouteParams};
pub use redirect::{RedirectRule, resolve_redirect};
pub use revalidate::{InvalidationReport, InvalidationRequest, Invalidator, KeyFailure};
pub use route::{FallbackMode, Revalidate, RouteTemplate, cache_key};
pub use seo::{HeadDocument, HeadTag, MetaAttr, SeoMeta, SeoStore, SeoSync, SharedSeoState};
pub use server::{HeraldParts, HeraldServer};
pub use sitemap::{ChangeFreq, Sitemap, SitemapEntry, SitemapSource};
