//! Best-effort IP geolocation.
//!
//! A [`GeoResolver`] walks an ordered list of [`GeoSource`] tiers, each bounded
//! by the same timeout budget, and falls back to a fixed default location when
//! every tier fails. `resolve` never returns an error.

mod ip_api;
mod prefix;

pub use ip_api::{GeoCache, IpApiSource};
pub use prefix::PrefixTable;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::{config::GeoMode, models::GeoInfo};

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("address is private or unroutable")]
    Private,
    #[error("lookup returned status {0:?}")]
    Status(String),
    #[error("lookup returned no usable data")]
    NoData,
    #[error("no prefix matched")]
    NoMatch,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One fallback tier.
#[async_trait]
pub trait GeoSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn locate(&self, ip: &str) -> Result<GeoInfo, GeoError>;
}

/// Where visitors are assumed to be when nothing better is known.
pub fn default_location() -> GeoInfo {
    GeoInfo {
        city: Some("Madrid, Madrid".into()),
        country: Some("Spain".into()),
        lat: Some(40.4168),
        lon: Some(-3.7038),
        isp: None,
    }
}

pub struct GeoResolver {
    tiers: Vec<Arc<dyn GeoSource>>,
    budget: Duration,
    fallback: GeoInfo,
}

impl GeoResolver {
    pub fn new(tiers: Vec<Arc<dyn GeoSource>>, budget: Duration) -> Self {
        Self {
            tiers,
            budget,
            fallback: default_location(),
        }
    }

    /// Build the tier list for a deployment mode: `online` asks ip-api first,
    /// `offline` only consults the built-in prefix table.
    pub fn for_mode(mode: GeoMode, api_url: &str, budget: Duration) -> Result<Self, GeoError> {
        let mut tiers: Vec<Arc<dyn GeoSource>> = Vec::new();
        if mode == GeoMode::Online {
            tiers.push(Arc::new(IpApiSource::new(api_url, budget)?));
        }
        tiers.push(Arc::new(PrefixTable::builtin()));
        Ok(Self::new(tiers, budget))
    }

    pub fn with_fallback(mut self, fallback: GeoInfo) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Locate `ip`, trying each tier in order. Takes at most one budget per
    /// tier and always yields a descriptor.
    pub async fn resolve(&self, ip: &str) -> GeoInfo {
        for tier in &self.tiers {
            match tokio::time::timeout(self.budget, tier.locate(ip)).await {
                Ok(Ok(info)) => {
                    tracing::debug!("geo: {} resolved {}", tier.name(), ip);
                    return info;
                }
                Ok(Err(e)) => tracing::debug!("geo: {} failed for {}: {}", tier.name(), ip, e),
                Err(_) => tracing::debug!(
                    "geo: {} timed out after {:?} for {}",
                    tier.name(),
                    self.budget,
                    ip
                ),
            }
        }

        tracing::debug!("geo: no tier resolved {}, using default location", ip);
        self.fallback.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct Fixed(GeoInfo);

    #[async_trait]
    impl GeoSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn locate(&self, _ip: &str) -> Result<GeoInfo, GeoError> {
            Ok(self.0.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl GeoSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn locate(&self, _ip: &str) -> Result<GeoInfo, GeoError> {
            Err(GeoError::Status("fail".into()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl GeoSource for Hanging {
        fn name(&self) -> &'static str {
            "hanging"
        }
        async fn locate(&self, _ip: &str) -> Result<GeoInfo, GeoError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(GeoInfo::default())
        }
    }

    fn place(city: &str) -> GeoInfo {
        GeoInfo {
            city: Some(city.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_successful_tier_wins() {
        let resolver = GeoResolver::new(
            vec![Arc::new(Fixed(place("first"))), Arc::new(Fixed(place("second")))],
            Duration::from_millis(100),
        );
        assert_eq!(resolver.resolve("8.8.8.8").await, place("first"));
    }

    #[tokio::test]
    async fn failing_tier_falls_through() {
        let resolver = GeoResolver::new(
            vec![Arc::new(Failing), Arc::new(Fixed(place("second")))],
            Duration::from_millis(100),
        );
        assert_eq!(resolver.resolve("8.8.8.8").await, place("second"));
    }

    #[tokio::test]
    async fn hanging_tier_is_cut_off_by_budget() {
        let resolver = GeoResolver::new(
            vec![Arc::new(Hanging), Arc::new(Fixed(place("second")))],
            Duration::from_millis(50),
        );

        let started = Instant::now();
        let info = resolver.resolve("8.8.8.8").await;
        assert_eq!(info, place("second"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn all_tiers_failing_yields_default_location() {
        let resolver = GeoResolver::new(
            vec![Arc::new(Failing), Arc::new(Hanging)],
            Duration::from_millis(50),
        );
        assert_eq!(resolver.resolve("8.8.8.8").await, default_location());

        let custom = GeoResolver::new(Vec::new(), Duration::from_millis(50))
            .with_fallback(place("elsewhere"));
        assert_eq!(custom.resolve("8.8.8.8").await, place("elsewhere"));
    }

    #[tokio::test]
    async fn offline_mode_uses_prefix_table_then_default() {
        let resolver =
            GeoResolver::for_mode(GeoMode::Offline, "http://unused", Duration::from_millis(50))
                .unwrap();

        let google = resolver.resolve("8.8.4.4").await;
        assert_eq!(google.country.as_deref(), Some("United States"));

        let unknown = resolver.resolve("203.0.113.9").await;
        assert_eq!(unknown, default_location());
    }
}
