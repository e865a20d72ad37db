#![forbid(unsafe_code)]
//! lifeline-sim library.
//!
//! Seeded synthetic corpora shaped like a personal timeline: sparse days,
//! dense photo bursts, the odd half-remembered date, and locations that
//! drift between a few home bases with occasional trips.
//!
//! The same [`CorpusConfig`] always produces the same events, which is what
//! the property tests, benches and the `ll synth` command rely on.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use lifeline_core::{Event, EventInstant, FuzzyDate, GeoLocation, Season};

const KINDS: [&str; 5] = ["photo", "note", "checkin", "milestone", "trip"];

/// A place events cluster around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeBase {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl HomeBase {
    fn new(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            name: name.to_string(),
            lat,
            lon,
        }
    }
}

/// Shape of a synthetic corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub seed: u64,
    pub count: usize,
    pub start_year: i32,
    pub years: u32,
    /// Probability that the next draw is a burst rather than a lone event.
    pub burst_share: f64,
    /// Burst sizes are drawn uniformly from this inclusive range.
    pub burst_size: (usize, usize),
    /// Standard deviation of a burst member's offset from the burst centre.
    pub burst_spread_minutes: f64,
    /// Probability that a lone event carries a fuzzy date.
    pub fuzzy_share: f64,
    pub located_share: f64,
    /// Probability that a located event is away from the current home base.
    pub travel_share: f64,
    pub private_share: f64,
    /// Standard deviation of location jitter around a base, in degrees.
    pub jitter_degrees: f64,
    pub homes: Vec<HomeBase>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            count: 1_000,
            start_year: 2004,
            years: 20,
            burst_share: 0.3,
            burst_size: (3, 12),
            burst_spread_minutes: 12.0,
            fuzzy_share: 0.08,
            located_share: 0.75,
            travel_share: 0.12,
            private_share: 0.05,
            jitter_degrees: 0.03,
            homes: vec![
                HomeBase::new("london", 51.5074, -0.1278),
                HomeBase::new("berlin", 52.52, 13.405),
                HomeBase::new("new-york", 40.7128, -74.006),
                HomeBase::new("tokyo", 35.6762, 139.6503),
            ],
        }
    }
}

impl CorpusConfig {
    /// Default shape with the given size, span and seed.
    #[must_use]
    pub fn sized(count: usize, years: u32, seed: u64) -> Self {
        Self {
            seed,
            count,
            years,
            ..Self::default()
        }
    }
}

/// Generate `config.count` events with ids `evt-00000`, `evt-00001`, ...
///
/// Events come out in generation order, not time order.
#[must_use]
pub fn generate(config: &CorpusConfig) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let start = Utc
        .with_ymd_and_hms(config.start_year, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let span_ms = (f64::from(config.years.max(1)) * 365.25 * 86_400_000.0) as i64;
    let burst_offset = Normal::new(0.0, config.burst_spread_minutes.abs() * 60_000.0).ok();
    let jitter = Normal::new(0.0, config.jitter_degrees.abs()).ok();

    let mut gen_state = Generator {
        config,
        start,
        span_ms,
        jitter,
        events: Vec::with_capacity(config.count),
    };

    while gen_state.events.len() < config.count {
        let centre = start + Duration::milliseconds(rng.gen_range(0..span_ms.max(1)));
        let remaining = config.count - gen_state.events.len();
        let (lo, hi) = (config.burst_size.0.max(1), config.burst_size.1.max(config.burst_size.0).max(1));

        if rng.gen_bool(config.burst_share.clamp(0.0, 1.0)) && remaining > 1 {
            let size = rng.gen_range(lo..=hi).min(remaining);
            let place = gen_state.place(&mut rng, centre);
            for _ in 0..size {
                let offset = burst_offset.map_or(0.0, |n| n.sample(&mut rng));
                let at = centre + Duration::milliseconds(offset as i64);
                gen_state.push(&mut rng, EventInstant::Precise(at), place);
            }
        } else {
            let instant = if rng.gen_bool(config.fuzzy_share.clamp(0.0, 1.0)) {
                fuzzy_around(&mut rng, centre).map_or(EventInstant::Precise(centre), EventInstant::Fuzzy)
            } else {
                EventInstant::Precise(centre)
            };
            let place = gen_state.place(&mut rng, centre);
            gen_state.push(&mut rng, instant, place);
        }
    }

    debug!(seed = config.seed, count = gen_state.events.len(), "generated synthetic corpus");
    gen_state.events
}

/// Deterministically shuffle `events` with `seed`.
#[must_use]
pub fn shuffled(mut events: Vec<Event>, seed: u64) -> Vec<Event> {
    events.shuffle(&mut StdRng::seed_from_u64(seed));
    events
}

struct Generator<'a> {
    config: &'a CorpusConfig,
    start: DateTime<Utc>,
    span_ms: i64,
    jitter: Option<Normal<f64>>,
    events: Vec<Event>,
}

impl Generator<'_> {
    /// Location for an event at `at`, or `None` when it should be unlocated.
    fn place(&self, rng: &mut StdRng, at: DateTime<Utc>) -> Option<GeoLocation> {
        let homes = &self.config.homes;
        if homes.is_empty() || !rng.gen_bool(self.config.located_share.clamp(0.0, 1.0)) {
            return None;
        }
        // Each home base owns an equal era of the timeline.
        let elapsed = (at - self.start).num_milliseconds().clamp(0, self.span_ms - 1);
        let bases = i64::try_from(homes.len()).unwrap_or(1);
        let era = usize::try_from(elapsed * bases / self.span_ms.max(1)).unwrap_or(0);
        let home = if rng.gen_bool(self.config.travel_share.clamp(0.0, 1.0)) {
            &homes[rng.gen_range(0..homes.len())]
        } else {
            &homes[era.min(homes.len() - 1)]
        };
        Some(GeoLocation::new(home.lat, home.lon, rng.gen_range(5.0..250.0)))
    }

    fn push(&mut self, rng: &mut StdRng, instant: EventInstant, place: Option<GeoLocation>) {
        let location = place.map(|mut loc| {
            let (dlat, dlon) = self
                .jitter
                .map_or((0.0, 0.0), |n| (n.sample(rng), n.sample(rng)));
            loc.point.lat = (loc.point.lat + dlat).clamp(-89.9, 89.9);
            loc.point.lon = wrap_lon(loc.point.lon + dlon);
            loc
        });
        let id = format!("evt-{:05}", self.events.len());
        let mut event = Event::new(id, instant).with_kind(KINDS[rng.gen_range(0..KINDS.len())]);
        event.location = location;
        event.private = rng.gen_bool(self.config.private_share.clamp(0.0, 1.0));
        event.payload = format!("blob://{}", self.events.len());
        self.events.push(event);
    }
}

fn wrap_lon(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    wrapped.clamp(-180.0, 180.0)
}

/// A fuzzy date containing `at`, with coarser granularities rarer.
fn fuzzy_around(rng: &mut StdRng, at: DateTime<Utc>) -> Option<FuzzyDate> {
    let (year, month) = (at.year(), at.month());
    let roll = rng.gen_range(0..100);
    let date = match roll {
        0..40 => FuzzyDate::day(year, month, at.day()),
        40..70 => FuzzyDate::month(year, month),
        70..85 => {
            let (season, anchor) = match month {
                12 => (Season::Winter, year),
                1 | 2 => (Season::Winter, year - 1),
                3..=5 => (Season::Spring, year),
                6..=8 => (Season::Summer, year),
                _ => (Season::Autumn, year),
            };
            FuzzyDate::season(anchor, season)
        }
        85..97 => FuzzyDate::year(year),
        _ => FuzzyDate::decade(year - year.rem_euclid(10)),
    };
    date.ok()
}
