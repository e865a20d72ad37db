//! Interactive viewport state.
//!
//! A pure state machine: every transition is a synchronous field update with
//! no I/O and no recomputation. Node lists are pulled separately through the
//! aggregator.
//!
//! Horizontal positions are absolute pixels from the timeline origin at the
//! current density: `x = days(origin, t) * pixels_per_day`. The viewport
//! shows `[viewport_start_px, viewport_start_px + width)`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use lifeline_cluster::ClusterId;
use lifeline_core::config::ZoomConfig;
use lifeline_core::model::days_between;
use lifeline_core::{EventId, TimeRange, ZoomTier};

const MILLIS_PER_DAY: f64 = 86_400_000.0;
/// Gap kept below a breakpoint when nudging the zoom level.
const TIER_MARGIN: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewportState {
    zoom_level: f64,
    zoom_tier: ZoomTier,
    pixels_per_day: f64,
    viewport_start_px: f64,
    viewport_width_px: f64,
    origin: DateTime<Utc>,
    expanded: BTreeSet<ClusterId>,
    focused_date: Option<DateTime<Utc>>,
    selected_event: Option<EventId>,
}

impl ViewportState {
    #[must_use]
    pub const fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    #[must_use]
    pub const fn zoom_tier(&self) -> ZoomTier {
        self.zoom_tier
    }

    #[must_use]
    pub const fn pixels_per_day(&self) -> f64 {
        self.pixels_per_day
    }

    #[must_use]
    pub const fn viewport_start_px(&self) -> f64 {
        self.viewport_start_px
    }

    #[must_use]
    pub const fn viewport_width_px(&self) -> f64 {
        self.viewport_width_px
    }

    #[must_use]
    pub const fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    #[must_use]
    pub const fn expanded(&self) -> &BTreeSet<ClusterId> {
        &self.expanded
    }

    #[must_use]
    pub fn is_expanded(&self, id: &ClusterId) -> bool {
        self.expanded.contains(id)
    }

    #[must_use]
    pub const fn focused_date(&self) -> Option<DateTime<Utc>> {
        self.focused_date
    }

    #[must_use]
    pub const fn selected_event(&self) -> Option<&EventId> {
        self.selected_event.as_ref()
    }

    /// Absolute x position of `instant`.
    #[must_use]
    pub fn x_of(&self, instant: DateTime<Utc>) -> f64 {
        days_between(self.origin, instant) * self.pixels_per_day
    }

    /// Instant at absolute x position `x`.
    #[must_use]
    pub fn instant_at(&self, x: f64) -> DateTime<Utc> {
        let millis = (x / self.pixels_per_day * MILLIS_PER_DAY).round() as i64;
        self.origin
            .checked_add_signed(Duration::milliseconds(millis))
            .unwrap_or(self.origin)
    }

    /// Instants currently on screen.
    #[must_use]
    pub fn visible_range(&self) -> TimeRange {
        TimeRange::new(
            self.instant_at(self.viewport_start_px),
            self.instant_at(self.viewport_start_px + self.viewport_width_px),
        )
    }

    fn centre_x(&self) -> f64 {
        self.viewport_start_px + self.viewport_width_px / 2.0
    }
}

/// Owns a [`ViewportState`] and the zoom configuration its transitions use.
#[derive(Debug, Clone)]
pub struct ViewportController {
    zoom: ZoomConfig,
    state: ViewportState,
}

impl ViewportController {
    /// Fully zoomed out, scrolled to `origin`.
    #[must_use]
    pub fn new(zoom: ZoomConfig, origin: DateTime<Utc>, width_px: f64) -> Self {
        let state = ViewportState {
            zoom_level: 0.0,
            zoom_tier: zoom.tier_at(0.0),
            pixels_per_day: zoom.pixels_per_day_at(0.0),
            viewport_start_px: 0.0,
            viewport_width_px: sanitize_width(width_px),
            origin,
            expanded: BTreeSet::new(),
            focused_date: None,
            selected_event: None,
        };
        Self { zoom, state }
    }

    #[must_use]
    pub const fn state(&self) -> &ViewportState {
        &self.state
    }

    #[must_use]
    pub const fn zoom_config(&self) -> &ZoomConfig {
        &self.zoom
    }

    /// Clamp `level` to `[0, 1]` and re-derive tier and density, keeping the
    /// instant under the viewport centre in place. Non-finite input is
    /// ignored.
    pub fn set_zoom_level(&mut self, level: f64) {
        if !level.is_finite() {
            return;
        }
        let centre = self.state.instant_at(self.state.centre_x());
        let level = level.clamp(0.0, 1.0);

        self.state.zoom_level = level;
        self.state.zoom_tier = self.zoom.tier_at(level);
        self.state.pixels_per_day = self.zoom.pixels_per_day_at(level);
        self.center_on(centre);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom_level(self.state.zoom_level + self.zoom.step);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom_level(self.state.zoom_level - self.zoom.step);
    }

    /// Scroll by `delta_px`; the start never goes below zero.
    pub fn pan(&mut self, delta_px: f64) {
        if delta_px.is_finite() {
            self.state.viewport_start_px = (self.state.viewport_start_px + delta_px).max(0.0);
        }
    }

    /// Put `instant` under the viewport centre, as far as the zero bound
    /// allows.
    pub fn center_on(&mut self, instant: DateTime<Utc>) {
        let start = self.state.x_of(instant) - self.state.viewport_width_px / 2.0;
        self.state.viewport_start_px = start.max(0.0);
    }

    pub fn set_viewport_width(&mut self, width_px: f64) {
        self.state.viewport_width_px = sanitize_width(width_px);
    }

    /// Move the origin, keeping the left edge on the same instant.
    pub fn set_origin(&mut self, origin: DateTime<Utc>) {
        let left = self.state.instant_at(self.state.viewport_start_px);
        self.state.origin = origin;
        self.state.viewport_start_px = self.state.x_of(left).max(0.0);
    }

    /// Expand or collapse `id`; returns whether it is now expanded.
    ///
    /// Expanding also nudges the zoom level up by the configured amount,
    /// stopping short of the next breakpoint so the tier never changes.
    pub fn toggle_cluster(&mut self, id: ClusterId) -> bool {
        if self.state.expanded.remove(&id) {
            return false;
        }
        self.state.expanded.insert(id);

        let level = self.state.zoom_level;
        let nudged = self
            .zoom
            .next_breakpoint(level)
            .map_or(level + self.zoom.expand_nudge, |next| {
                (level + self.zoom.expand_nudge).min(next - TIER_MARGIN)
            });
        if nudged > level {
            self.set_zoom_level(nudged);
        }
        true
    }

    pub fn collapse_all(&mut self) {
        self.state.expanded.clear();
    }

    pub fn select_event(&mut self, id: Option<EventId>) {
        self.state.selected_event = id;
    }

    pub fn set_focused_date(&mut self, date: Option<DateTime<Utc>>) {
        self.state.focused_date = date;
    }
}

fn sanitize_width(width_px: f64) -> f64 {
    if width_px.is_finite() && width_px >= 1.0 {
        width_px
    } else {
        1.0
    }
}
