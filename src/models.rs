use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shortened link together with its full click history.
///
/// This is also the on-disk shape of one entry in the JSON document, so field
/// names are camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub id: String,
    pub destination: String,
    pub created_at: DateTime<Utc>,
    /// Chronological, append-only.
    #[serde(default)]
    pub clicks: Vec<Click>,
}

impl Link {
    pub fn new(id: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            destination: destination.into(),
            created_at: Utc::now(),
            clicks: Vec::new(),
        }
    }
}

/// A single redirect event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Click {
    pub ip: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub referrer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
}

/// Best-effort location for an IP address. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub city: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub isp: Option<String>,
}

impl GeoInfo {
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.country.is_none()
            && self.lat.is_none()
            && self.lon.is_none()
            && self.isp.is_none()
    }
}

/// Browser / OS / device category parsed from the User-Agent header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: Option<String>,
    pub os: Option<String>,
    pub category: Option<String>,
}
