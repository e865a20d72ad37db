use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::FuzzyDate;

/// Unique, totally ordered event identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// When an event happened: an exact timestamp or an approximate date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventInstant {
    Precise(DateTime<Utc>),
    Fuzzy(FuzzyDate),
}

impl EventInstant {
    #[must_use]
    pub const fn is_fuzzy(&self) -> bool {
        matches!(self, Self::Fuzzy(_))
    }
}

impl From<DateTime<Utc>> for EventInstant {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Precise(value)
    }
}

impl From<FuzzyDate> for EventInstant {
    fn from(value: FuzzyDate) -> Self {
        Self::Fuzzy(value)
    }
}

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are finite and inside their WGS84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A point plus the radius (metres) within which it is believed accurate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(flatten)]
    pub point: GeoPoint,
    #[serde(default)]
    pub precision_m: f64,
}

impl GeoLocation {
    #[must_use]
    pub const fn new(lat: f64, lon: f64, precision_m: f64) -> Self {
        Self {
            point: GeoPoint::new(lat, lon),
            precision_m,
        }
    }
}

/// A single life event as supplied by the event repository.
///
/// Events are immutable once clustered; an edit produces a new `Event` and a
/// new [`super::DataVersion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub instant: EventInstant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    /// Event-type tag (`photo`, `trip`, `milestone`, ...).
    #[serde(default)]
    pub kind: String,
    /// Opaque reference into the payload store.
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub private: bool,
}

impl Event {
    /// Minimal event with no location, tag or payload.
    #[must_use]
    pub fn new(id: impl Into<EventId>, instant: impl Into<EventInstant>) -> Self {
        Self {
            id: id.into(),
            instant: instant.into(),
            location: None,
            kind: String::new(),
            payload: String::new(),
            private: false,
        }
    }

    #[must_use]
    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }
}
