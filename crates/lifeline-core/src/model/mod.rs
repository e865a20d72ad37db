//! Domain types: events, fuzzy dates, zoom tiers and time ranges.

mod event;
mod fuzzy;
mod tier;
mod time;

pub use event::{Event, EventId, EventInstant, GeoLocation, GeoPoint};
pub use fuzzy::{DateError, FuzzyDate, Granularity, Season, SeasonStarts};
pub use tier::{ParseTierError, ZoomTier};
pub use time::{DataVersion, TimeRange, days_between, millis_to_instant};
