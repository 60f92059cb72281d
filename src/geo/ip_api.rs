use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{GeoError, GeoSource};
use crate::{client_ip, models::GeoInfo};

// ── Cache ──────────────────────────────────────────────────────────────────

/// Entries kept before the cache starts evicting.
const CACHE_CAPACITY: usize = 10_000;
/// How long an answer (hit or miss) stays usable.
const CACHE_TTL: Duration = Duration::from_secs(6 * 3600);

/// Thread-safe in-memory cache: IP string → Option<GeoInfo>.
/// `None` means the service answered but had nothing useful for that IP.
/// Transport failures and timeouts are not cached.
///
/// The key comes from a client-controlled header, so the cache is capped at
/// `capacity` entries and every entry expires after `ttl`.
#[derive(Clone, Debug)]
pub struct GeoCache {
    inner: Arc<DashMap<String, (Instant, Option<GeoInfo>)>>,
    capacity: usize,
    ttl: Duration,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::with_limits(CACHE_CAPACITY, CACHE_TTL)
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Outer `None`: not cached (or expired). Inner `None`: a known miss.
    pub fn get(&self, ip: &str) -> Option<Option<GeoInfo>> {
        let (stored_at, value) = self.inner.get(ip).map(|e| e.value().clone())?;
        if stored_at.elapsed() < self.ttl {
            return Some(value);
        }
        self.inner.remove(ip);
        None
    }

    pub fn insert(&self, ip: &str, value: Option<GeoInfo>) {
        if !self.inner.contains_key(ip) && self.inner.len() >= self.capacity {
            self.make_room();
        }
        self.inner.insert(ip.to_owned(), (Instant::now(), value));
    }

    /// Drop expired entries; if that frees nothing, drop the oldest one.
    fn make_room(&self) {
        let ttl = self.ttl;
        self.inner.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        if self.inner.len() < self.capacity {
            return;
        }

        let oldest = self
            .inner
            .iter()
            .min_by_key(|e| e.value().0)
            .map(|e| e.key().clone());
        if let Some(ip) = oldest {
            self.inner.remove(&ip);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for GeoCache {
    fn default() -> Self {
        Self::new()
    }
}

// ── ip-api.com response shape ──────────────────────────────────────────────

#[derive(Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    isp: Option<String>,
}

const FIELDS: &str = "status,message,country,regionName,city,lat,lon,isp";

// ── Source ─────────────────────────────────────────────────────────────────

/// Location-by-IP lookup against an ip-api.com compatible endpoint.
pub struct IpApiSource {
    client: reqwest::Client,
    base_url: String,
    cache: GeoCache,
}

impl IpApiSource {
    /// `base_url` is the endpoint the IP is appended to, e.g.
    /// `http://ip-api.com/json`. Every request is capped at `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            cache: GeoCache::new(),
        })
    }

    pub fn cache(&self) -> &GeoCache {
        &self.cache
    }

    async fn fetch(&self, ip: &str) -> Result<GeoInfo, GeoError> {
        let url = format!("{}/{}?fields={}", self.base_url, ip, FIELDS);

        let body: IpApiResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if body.status != "success" {
            return Err(GeoError::Status(body.message.unwrap_or(body.status)));
        }

        let city = non_empty(body.city);
        let region = non_empty(body.region_name);
        let info = GeoInfo {
            city: match (city, region) {
                (Some(city), Some(region)) => Some(format!("{city}, {region}")),
                (city, region) => city.or(region),
            },
            country: non_empty(body.country),
            lat: body.lat,
            lon: body.lon,
            isp: non_empty(body.isp),
        };

        // Treat completely empty results as a miss
        if info.is_empty() {
            return Err(GeoError::NoData);
        }

        Ok(info)
    }
}

#[async_trait]
impl GeoSource for IpApiSource {
    fn name(&self) -> &'static str {
        "ip-api"
    }

    async fn locate(&self, ip: &str) -> Result<GeoInfo, GeoError> {
        // Skip addresses that can never be geolocated
        if !client_ip::is_public(ip) {
            return Err(GeoError::Private);
        }

        // Check cache first (covers both successful hits and known misses)
        if let Some(entry) = self.cache.get(ip) {
            return entry.ok_or(GeoError::NoData);
        }

        let result = self.fetch(ip).await;
        match &result {
            Ok(info) => {
                self.cache.insert(ip, Some(info.clone()));
            }
            Err(GeoError::Status(_)) | Err(GeoError::NoData) => {
                self.cache.insert(ip, None);
            }
            Err(_) => {}
        }
        result
    }
}

// ── Internal helpers ───────────────────────────────────────────────────────

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
