//! Ingestion: turning repository events into a sorted, comparable snapshot.
//!
//! Every accepted event gets an approximate instant, a comparison range and a
//! certainty weight. Events that cannot be normalized are rejected and
//! reported back to the caller; nothing is clamped or coerced.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::ErrorCode;
use crate::model::{
    DataVersion, DateError, Event, EventId, EventInstant, FuzzyDate, GeoLocation, SeasonStarts,
    TimeRange,
};
use crate::timing::timed;

// ---------------------------------------------------------------------------
// Errors and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IngestError {
    #[error("event {id}: {source}")]
    InvalidDate {
        id: EventId,
        #[source]
        source: DateError,
    },

    #[error("event {id}: location ({lat}, {lon}) ±{precision_m}m is not a valid coordinate")]
    InvalidLocation {
        id: EventId,
        lat: f64,
        lon: f64,
        precision_m: f64,
    },

    #[error("event {id}: duplicate id")]
    DuplicateId { id: EventId },
}

impl IngestError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidDate { .. } => ErrorCode::InvalidDate,
            Self::InvalidLocation { .. } => ErrorCode::InvalidLocation,
            Self::DuplicateId { .. } => ErrorCode::DuplicateEventId,
        }
    }

    #[must_use]
    pub const fn event_id(&self) -> &EventId {
        match self {
            Self::InvalidDate { id, .. }
            | Self::InvalidLocation { id, .. }
            | Self::DuplicateId { id } => id,
        }
    }
}

/// Outcome of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub accepted: usize,
    pub rejected: Vec<IngestError>,
}

impl IngestReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// An event paired with the values clustering compares on.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub event: Event,
    /// Sort key and centroid input.
    pub approx: DateTime<Utc>,
    /// `[earliest, latest)`; one millisecond wide for precise timestamps.
    pub range: TimeRange,
    /// Weight in `(0, 1]`; 1.0 for precise timestamps.
    pub certainty: f64,
}

impl NormalizedEvent {
    #[must_use]
    pub const fn id(&self) -> &EventId {
        &self.event.id
    }

    #[must_use]
    pub const fn location(&self) -> Option<&GeoLocation> {
        self.event.location.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalizer {
    seasons: SeasonStarts,
}

impl Normalizer {
    #[must_use]
    pub const fn new(seasons: SeasonStarts) -> Self {
        Self { seasons }
    }

    #[must_use]
    pub const fn seasons(&self) -> &SeasonStarts {
        &self.seasons
    }

    /// Resolve an event's instant and validate its location.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidDate`] when the date cannot be resolved under the
    /// configured season mapping, [`IngestError::InvalidLocation`] for
    /// out-of-range or non-finite coordinates.
    pub fn normalize(&self, event: Event) -> Result<NormalizedEvent, IngestError> {
        let (approx, range, certainty) = match event.instant {
            EventInstant::Precise(at) => {
                let end = at.checked_add_signed(Duration::milliseconds(1)).unwrap_or(at);
                (at, TimeRange::new(at, end), 1.0)
            }
            EventInstant::Fuzzy(date) => {
                let resolved = date
                    .approximate_instant(&self.seasons)
                    .and_then(|approx| Ok((approx, date.comparison_range(&self.seasons)?)));
                let (approx, range) = resolved.map_err(|source| IngestError::InvalidDate {
                    id: event.id.clone(),
                    source,
                })?;
                (approx, range, date.granularity().certainty())
            }
        };

        if let Some(location) = &event.location {
            let precision_ok = location.precision_m.is_finite() && location.precision_m >= 0.0;
            if !location.point.is_valid() || !precision_ok {
                return Err(IngestError::InvalidLocation {
                    id: event.id.clone(),
                    lat: location.point.lat,
                    lon: location.point.lon,
                    precision_m: location.precision_m,
                });
            }
        }

        Ok(NormalizedEvent {
            event,
            approx,
            range,
            certainty,
        })
    }
}

/// Parse an instant written either as RFC 3339 or as a fuzzy date form.
///
/// # Errors
///
/// Returns the fuzzy-date parse error when neither form matches.
pub fn parse_instant(raw: &str) -> Result<EventInstant, DateError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(EventInstant::Precise(at.with_timezone(&Utc)));
    }
    raw.parse::<FuzzyDate>().map(EventInstant::Fuzzy)
}

// ---------------------------------------------------------------------------
// Raw snapshot form
// ---------------------------------------------------------------------------

/// Event as it appears in a JSON snapshot, with the instant kept as text so
/// a malformed date rejects one event instead of the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: EventId,
    pub instant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub private: bool,
}

impl RawEvent {
    /// # Errors
    ///
    /// Fails when the instant text is neither RFC 3339 nor a fuzzy date.
    pub fn into_event(self) -> Result<Event, IngestError> {
        let instant = parse_instant(&self.instant).map_err(|source| IngestError::InvalidDate {
            id: self.id.clone(),
            source,
        })?;
        Ok(Event {
            id: self.id,
            instant,
            location: self.location,
            kind: self.kind,
            payload: self.payload,
            private: self.private,
        })
    }
}

impl From<&Event> for RawEvent {
    fn from(event: &Event) -> Self {
        let instant = match event.instant {
            EventInstant::Precise(at) => at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            EventInstant::Fuzzy(date) => date.to_string(),
        };
        Self {
            id: event.id.clone(),
            instant,
            location: event.location,
            kind: event.kind.clone(),
            payload: event.payload.clone(),
            private: event.private,
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Normalized snapshot sorted by `(approx, id)`, tagged with its version.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    version: DataVersion,
    events: Vec<NormalizedEvent>,
    positions: HashMap<EventId, usize>,
}

impl Dataset {
    /// Normalize `events`, dropping and reporting the ones that fail.
    ///
    /// The first occurrence of an id wins; later ones are rejected as
    /// duplicates. Zero accepted events is a valid, empty dataset.
    pub fn ingest(
        events: impl IntoIterator<Item = Event>,
        version: DataVersion,
        normalizer: &Normalizer,
    ) -> (Self, IngestReport) {
        Self::ingest_results(events.into_iter().map(Ok), version, normalizer)
    }

    /// Like [`Dataset::ingest`], for events whose instants are still text.
    pub fn ingest_raw(
        events: impl IntoIterator<Item = RawEvent>,
        version: DataVersion,
        normalizer: &Normalizer,
    ) -> (Self, IngestReport) {
        Self::ingest_results(events.into_iter().map(RawEvent::into_event), version, normalizer)
    }

    fn ingest_results(
        events: impl Iterator<Item = Result<Event, IngestError>>,
        version: DataVersion,
        normalizer: &Normalizer,
    ) -> (Self, IngestReport) {
        timed("normalize", || {
            let mut report = IngestReport::default();
            let mut seen = HashSet::new();
            let mut accepted = Vec::new();

            for event in events {
                let result = event.and_then(|event| {
                    if seen.contains(&event.id) {
                        return Err(IngestError::DuplicateId { id: event.id });
                    }
                    let normalized = normalizer.normalize(event)?;
                    seen.insert(normalized.event.id.clone());
                    Ok(normalized)
                });
                match result {
                    Ok(normalized) => accepted.push(normalized),
                    Err(err) => {
                        warn!(event_id = %err.event_id(), code = %err.code(), error = %err, "rejected event");
                        report.rejected.push(err);
                    }
                }
            }

            accepted.sort_by(|a, b| a.approx.cmp(&b.approx).then_with(|| a.id().cmp(b.id())));
            report.accepted = accepted.len();
            debug!(
                version = %version,
                accepted = report.accepted,
                rejected = report.rejected.len(),
                "ingested snapshot"
            );
            if accepted.is_empty() {
                debug!(%version, code = %ErrorCode::EmptyDataset, "snapshot has no usable events");
            }
            (Self::from_sorted(accepted, version), report)
        })
    }

    fn from_sorted(events: Vec<NormalizedEvent>, version: DataVersion) -> Self {
        let positions = events
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id().clone(), i))
            .collect();
        Self {
            version,
            events,
            positions,
        }
    }

    #[must_use]
    pub const fn version(&self) -> DataVersion {
        self.version
    }

    /// Same events under a new version (payload-only edits).
    #[must_use]
    pub fn with_version(mut self, version: DataVersion) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn events(&self) -> &[NormalizedEvent] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Index of `id` in sorted order.
    #[must_use]
    pub fn position(&self, id: &EventId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    #[must_use]
    pub fn get(&self, id: &EventId) -> Option<&NormalizedEvent> {
        self.position(id).map(|i| &self.events[i])
    }

    /// Earliest to latest approximate instant, end exclusive by one
    /// millisecond. `None` for an empty dataset.
    #[must_use]
    pub fn time_bounds(&self) -> Option<TimeRange> {
        let first = self.events.first()?;
        let last = self.events.last()?;
        let end = last
            .approx
            .checked_add_signed(Duration::milliseconds(1))
            .unwrap_or(last.approx);
        Some(TimeRange::new(first.approx, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Season;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("valid instant")
    }

    #[test]
    fn sorted_by_approx_then_id() {
        let summer = FuzzyDate::season(2020, Season::Summer).expect("season");
        let events = vec![
            Event::new("c", at(2020, 7, 15, 0)),
            Event::new("b", summer),
            Event::new("a", at(2019, 1, 1, 0)),
        ];
        let (dataset, report) = Dataset::ingest(events, DataVersion::new(1), &Normalizer::default());
        assert!(report.is_clean());

        let ids: Vec<&str> = dataset.events().iter().map(|e| e.id().as_str()).collect();
        // b and c share 2020-07-15 00:00, so the id decides.
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(dataset.position(&EventId::from("c")), Some(2));
        assert!((dataset.events()[1].certainty - 0.45).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_duplicates_and_bad_locations() {
        let events = vec![
            Event::new("a", at(2020, 1, 1, 0)),
            Event::new("a", at(2021, 1, 1, 0)),
            Event::new("b", at(2020, 1, 2, 0)).with_location(GeoLocation::new(95.0, 0.0, 10.0)),
            Event::new("c", at(2020, 1, 3, 0)).with_location(GeoLocation::new(10.0, 10.0, -1.0)),
        ];
        let (dataset, report) = Dataset::ingest(events, DataVersion::new(1), &Normalizer::default());
        assert_eq!(dataset.len(), 1);
        assert_eq!(report.accepted, 1);

        let codes: Vec<ErrorCode> = report.rejected.iter().map(IngestError::code).collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::DuplicateEventId,
                ErrorCode::InvalidLocation,
                ErrorCode::InvalidLocation
            ]
        );
        // The first occurrence is the one kept.
        assert_eq!(dataset.events()[0].approx, at(2020, 1, 1, 0));
    }

    #[test]
    fn raw_events_with_bad_dates_are_reported_individually() {
        let raw: Vec<RawEvent> = serde_json::from_str(
            r#"[
                {"id": "ok", "instant": "2020-07-04T18:30:00Z"},
                {"id": "fuzzy", "instant": "spring 2021"},
                {"id": "bad", "instant": "2020-13"},
                {"id": "worse", "instant": "sometime"}
            ]"#,
        )
        .expect("snapshot");
        let (dataset, report) = Dataset::ingest_raw(raw, DataVersion::new(3), &Normalizer::default());
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.version(), DataVersion::new(3));
        assert_eq!(report.rejected.len(), 2);
        assert!(report.rejected.iter().all(|e| e.code() == ErrorCode::InvalidDate));
    }

    #[test]
    fn misconfigured_seasons_reject_season_dates_only() {
        let normalizer = Normalizer::new(SeasonStarts {
            autumn: 0,
            ..SeasonStarts::default()
        });
        let events = vec![
            Event::new("x", FuzzyDate::season(2020, Season::Autumn).expect("season")),
            Event::new("y", FuzzyDate::year(2020).expect("year")),
        ];
        let (dataset, report) = Dataset::ingest(events, DataVersion::new(1), &normalizer);
        assert_eq!(dataset.len(), 1);
        assert_eq!(report.rejected[0].event_id().as_str(), "x");
    }

    #[test]
    fn empty_snapshot_is_valid() {
        let (dataset, report) = Dataset::ingest(Vec::new(), DataVersion::new(9), &Normalizer::default());
        assert!(dataset.is_empty());
        assert!(dataset.time_bounds().is_none());
        assert!(report.is_clean());
    }

    #[test]
    fn raw_form_round_trips_instants() {
        let event = Event::new("p", at(2020, 7, 4, 18));
        let raw = RawEvent::from(&event);
        assert_eq!(raw.instant, "2020-07-04T18:00:00Z");
        assert_eq!(raw.into_event().expect("parse"), event);

        let fuzzy = Event::new("f", FuzzyDate::decade(1990).expect("decade"));
        assert_eq!(RawEvent::from(&fuzzy).instant, "1990s");
    }
}
