//! The redirect path: resolve the link, enrich the click, record it, and hand
//! back the destination.
//!
//! ```text
//! RECEIVED → RESOLVED | NOT_FOUND → ENRICHED | ENRICHMENT_SKIPPED → RECORDED → REDIRECTED
//! ```
//!
//! Enrichment is bounded by the geo resolver's budget and can only degrade
//! the click, never fail the redirect.

use std::sync::Arc;

use chrono::Utc;
use woothee::parser::Parser;

use crate::{
    client_ip::ClientAddress,
    error::AppError,
    geo::GeoResolver,
    models::{Click, DeviceInfo},
    store::LinkStore,
};

/// Recorded as the user agent when the header is absent.
pub const UNKNOWN_USER_AGENT: &str = "unknown";

/// A single visit to a short link, as seen at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct Visit {
    pub id: String,
    pub client: ClientAddress,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Clone)]
pub struct RedirectPipeline {
    store: LinkStore,
    geo: Arc<GeoResolver>,
}

impl RedirectPipeline {
    pub fn new(store: LinkStore, geo: Arc<GeoResolver>) -> Self {
        Self { store, geo }
    }

    /// Run a visit to completion and return the destination to redirect to.
    ///
    /// Unknown ids fail with [`AppError::NotFound`] before anything is
    /// recorded. A link deleted while the visit is in flight also ends as
    /// not-found.
    pub async fn run(&self, visit: Visit) -> Result<String, AppError> {
        let timestamp = Utc::now();
        let ip = visit.client.resolve();
        tracing::debug!(id = %visit.id, %ip, "redirect received");

        let link = self
            .store
            .find_by_id(&visit.id)
            .await
            .inspect_err(|_| tracing::debug!(id = %visit.id, "redirect target not found"))?;

        let geo = self.geo.resolve(&ip).await;
        tracing::debug!(id = %link.id, ?geo, "click enriched");

        let user_agent = visit.user_agent.filter(|ua| !ua.trim().is_empty());
        let device = parse_user_agent(user_agent.as_deref());

        let click = Click {
            ip,
            user_agent: user_agent.unwrap_or_else(|| UNKNOWN_USER_AGENT.to_owned()),
            timestamp,
            referrer: visit.referrer.filter(|r| !r.is_empty()),
            geo: Some(geo).filter(|g| !g.is_empty()),
            device,
        };

        self.store.record_click(&link.id, click).await?;
        tracing::info!("Click recorded for '{}' -> {}", link.id, link.destination);

        Ok(link.destination)
    }
}

/// Parse a User-Agent string using woothee. Returns `None` when nothing at
/// all is recognised.
fn parse_user_agent(ua: Option<&str>) -> Option<DeviceInfo> {
    let ua = ua.filter(|s| !s.is_empty())?;
    let parser = Parser::new();
    let result = parser.parse(ua)?;

    let known = |value: &str| {
        if value.is_empty() || value == "UNKNOWN" {
            None
        } else {
            Some(value.to_owned())
        }
    };

    let device = DeviceInfo {
        browser: known(result.name),
        os: known(result.os),
        category: known(result.category),
    };

    if device == DeviceInfo::default() {
        None
    } else {
        Some(device)
    }
}
