use async_trait::async_trait;

use super::{GeoError, GeoSource};
use crate::models::GeoInfo;

/// Static address-prefix → location table, for offline/demo use or when the
/// external lookup is unavailable. Entries are checked in order; the first
/// matching prefix wins, so list more specific prefixes first.
#[derive(Debug, Clone)]
pub struct PrefixTable {
    entries: Vec<(String, GeoInfo)>,
}

fn place(
    city: &str,
    country: &str,
    coords: Option<(f64, f64)>,
    isp: Option<&str>,
) -> GeoInfo {
    GeoInfo {
        city: Some(city.to_owned()),
        country: Some(country.to_owned()),
        lat: coords.map(|(lat, _)| lat),
        lon: coords.map(|(_, lon)| lon),
        isp: isp.map(str::to_owned),
    }
}

impl PrefixTable {
    pub fn new(entries: Vec<(String, GeoInfo)>) -> Self {
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(vec![
            ("127.".into(), place("Localhost", "Local", None, Some("Loopback"))),
            ("10.".into(), place("Private network", "Local", None, None)),
            ("192.168.".into(), place("Local network", "Local", None, None)),
            (
                "8.8.".into(),
                place(
                    "Mountain View, California",
                    "United States",
                    Some((37.4056, -122.0775)),
                    Some("Google LLC"),
                ),
            ),
            (
                "1.1.".into(),
                place(
                    "San Francisco, California",
                    "United States",
                    Some((37.7749, -122.4194)),
                    Some("Cloudflare, Inc."),
                ),
            ),
            (
                "208.67.".into(),
                place(
                    "San Francisco, California",
                    "United States",
                    Some((37.7749, -122.4194)),
                    Some("OpenDNS, LLC"),
                ),
            ),
        ])
    }

    pub fn lookup(&self, ip: &str) -> Option<&GeoInfo> {
        self.entries
            .iter()
            .find(|(prefix, _)| ip.starts_with(prefix.as_str()))
            .map(|(_, info)| info)
    }
}

#[async_trait]
impl GeoSource for PrefixTable {
    fn name(&self) -> &'static str {
        "prefix-table"
    }

    async fn locate(&self, ip: &str) -> Result<GeoInfo, GeoError> {
        self.lookup(ip).cloned().ok_or(GeoError::NoMatch)
    }
}
