use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ErrorCode;
use crate::model::{SeasonStarts, ZoomTier};

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub tiers: TierThresholds,
    #[serde(default)]
    pub burst: BurstConfig,
    #[serde(default)]
    pub zoom: ZoomConfig,
    #[serde(default)]
    pub seasons: SeasonStarts,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Clustering thresholds for one zoom tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// A gap longer than this (in days) between consecutive events starts a
    /// new temporal cluster.
    pub gap_days: f64,
    /// Sub-cluster centroids closer than this (great-circle km) are merged.
    pub distance_km: f64,
    /// Visible ranges are snapped outward to multiples of this many days
    /// before selection, so small pans reuse memoized node lists.
    pub bucket_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_year_tier")]
    pub year: TierConfig,
    #[serde(default = "default_month_tier")]
    pub month: TierConfig,
    #[serde(default = "default_week_tier")]
    pub week: TierConfig,
    #[serde(default = "default_day_tier")]
    pub day: TierConfig,
    /// Only `bucket_days` is used: the focus tier is all singletons.
    #[serde(default = "default_focus_tier")]
    pub focus: TierConfig,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            year: default_year_tier(),
            month: default_month_tier(),
            week: default_week_tier(),
            day: default_day_tier(),
            focus: default_focus_tier(),
        }
    }
}

impl TierThresholds {
    #[must_use]
    pub const fn get(&self, tier: ZoomTier) -> &TierConfig {
        match tier {
            ZoomTier::Year => &self.year,
            ZoomTier::Month => &self.month,
            ZoomTier::Week => &self.week,
            ZoomTier::Day => &self.day,
            ZoomTier::Focus => &self.focus,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BurstConfig {
    /// Minimum run length tagged as a burst.
    #[serde(default = "default_burst_min_size")]
    pub min_size: usize,
    /// Maximum first-to-last span of a burst, in minutes.
    #[serde(default = "default_burst_window_minutes")]
    pub window_minutes: f64,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            min_size: default_burst_min_size(),
            window_minutes: default_burst_window_minutes(),
        }
    }
}

/// One control point of the pixels-per-day curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub zoom: f64,
    pub pixels_per_day: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomConfig {
    /// Four ascending zoom levels separating year|month|week|day|focus.
    #[serde(default = "default_breakpoints")]
    pub breakpoints: Vec<f64>,
    /// Zoom delta applied by zoom-in / zoom-out.
    #[serde(default = "default_zoom_step")]
    pub step: f64,
    /// Zoom increase applied when a cluster is manually expanded.
    #[serde(default = "default_expand_nudge")]
    pub expand_nudge: f64,
    /// Control points, ascending in zoom, non-decreasing in pixels per day.
    /// Interpolated geometrically between points and held flat outside them.
    #[serde(default = "default_curve")]
    pub pixels_per_day: Vec<CurvePoint>,
}

impl Default for ZoomConfig {
    fn default() -> Self {
        Self {
            breakpoints: default_breakpoints(),
            step: default_zoom_step(),
            expand_nudge: default_expand_nudge(),
            pixels_per_day: default_curve(),
        }
    }
}

impl ZoomConfig {
    /// Tier for a zoom level in `[0, 1]`.
    #[must_use]
    pub fn tier_at(&self, level: f64) -> ZoomTier {
        let passed = self.breakpoints.iter().filter(|b| level >= **b).count();
        ZoomTier::ALL[passed.min(ZoomTier::ALL.len() - 1)]
    }

    /// First breakpoint strictly above `level`, where the next finer tier
    /// starts.
    #[must_use]
    pub fn next_breakpoint(&self, level: f64) -> Option<f64> {
        self.breakpoints.iter().copied().find(|b| *b > level)
    }

    /// Pixels per day at a zoom level; monotonic non-decreasing for a
    /// validated curve.
    #[must_use]
    pub fn pixels_per_day_at(&self, level: f64) -> f64 {
        let curve = &self.pixels_per_day;
        let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
            return 1.0;
        };
        if level <= first.zoom {
            return first.pixels_per_day;
        }
        if level >= last.zoom {
            return last.pixels_per_day;
        }
        for pair in curve.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if level <= b.zoom {
                let t = (level - a.zoom) / (b.zoom - a.zoom);
                let (la, lb) = (a.pixels_per_day.ln(), b.pixels_per_day.ln());
                return (la + t * (lb - la)).exp().clamp(a.pixels_per_day, b.pixels_per_day);
            }
        }
        last.pixels_per_day
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Lookahead margin on each side, as a fraction of the visible span.
    #[serde(default = "default_lookahead_fraction")]
    pub lookahead_fraction: f64,
    /// Maximum memoized node lists.
    #[serde(default = "default_cache_entries")]
    pub cache_entries: u64,
    /// Quiescence required after a viewport change before recomputing.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Smallest width hint handed to the renderer.
    #[serde(default = "default_min_node_px")]
    pub min_node_px: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            lookahead_fraction: default_lookahead_fraction(),
            cache_entries: default_cache_entries(),
            debounce_ms: default_debounce_ms(),
            min_node_px: default_min_node_px(),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("tier {tier}: {field} must be positive and finite, got {value}")]
    NonPositive {
        tier: ZoomTier,
        field: &'static str,
        value: f64,
    },

    #[error("tier {finer} {field} ({finer_value}) exceeds coarser tier {coarser} ({coarser_value})")]
    ThresholdInversion {
        coarser: ZoomTier,
        finer: ZoomTier,
        field: &'static str,
        coarser_value: f64,
        finer_value: f64,
    },

    #[error("zoom breakpoints must be four strictly ascending values in (0, 1), got {0:?}")]
    Breakpoints(Vec<f64>),

    #[error("pixels-per-day curve invalid: {0}")]
    Curve(String),

    #[error("burst: {0}")]
    Burst(String),

    #[error("render: {0}")]
    Render(String),

    #[error("seasons: {0}")]
    Seasons(String),

    #[error("syntax: {0}")]
    Parse(String),
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) => ErrorCode::ConfigParseError,
            _ => ErrorCode::InvalidConfig,
        }
    }
}

impl EngineConfig {
    /// Check every numeric invariant the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_tiers()?;
        self.validate_zoom()?;

        if self.burst.min_size == 0 {
            return Err(ConfigError::Burst("min_size must be at least 1".into()));
        }
        if !(self.burst.window_minutes.is_finite() && self.burst.window_minutes >= 0.0) {
            return Err(ConfigError::Burst(format!(
                "window_minutes must be non-negative, got {}",
                self.burst.window_minutes
            )));
        }

        self.seasons
            .validate()
            .map_err(|e| ConfigError::Seasons(e.to_string()))?;

        let render = &self.render;
        if !(render.lookahead_fraction.is_finite() && render.lookahead_fraction >= 0.0) {
            return Err(ConfigError::Render(format!(
                "lookahead_fraction must be non-negative, got {}",
                render.lookahead_fraction
            )));
        }
        if render.cache_entries == 0 {
            return Err(ConfigError::Render("cache_entries must be at least 1".into()));
        }
        Ok(())
    }

    fn validate_tiers(&self) -> Result<(), ConfigError> {
        for tier in ZoomTier::ALL {
            let cfg = self.tiers.get(tier);
            let mut fields = vec![("bucket_days", cfg.bucket_days)];
            if tier != ZoomTier::Focus {
                fields.push(("gap_days", cfg.gap_days));
                fields.push(("distance_km", cfg.distance_km));
            }
            for (field, value) in fields {
                if !(value.is_finite() && value > 0.0) {
                    return Err(ConfigError::NonPositive { tier, field, value });
                }
            }
        }

        let clustered = [ZoomTier::Year, ZoomTier::Month, ZoomTier::Week, ZoomTier::Day];
        for pair in clustered.windows(2) {
            let (coarser, finer) = (pair[0], pair[1]);
            let (c, f) = (self.tiers.get(coarser), self.tiers.get(finer));
            for (field, coarser_value, finer_value) in [
                ("gap_days", c.gap_days, f.gap_days),
                ("distance_km", c.distance_km, f.distance_km),
            ] {
                if finer_value > coarser_value {
                    return Err(ConfigError::ThresholdInversion {
                        coarser,
                        finer,
                        field,
                        coarser_value,
                        finer_value,
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_zoom(&self) -> Result<(), ConfigError> {
        let bp = &self.zoom.breakpoints;
        let ascending = bp.windows(2).all(|w| w[0] < w[1]);
        let in_range = bp.iter().all(|b| *b > 0.0 && *b < 1.0);
        if bp.len() != ZoomTier::ALL.len() - 1 || !ascending || !in_range {
            return Err(ConfigError::Breakpoints(bp.clone()));
        }

        let curve = &self.zoom.pixels_per_day;
        if curve.len() < 2 {
            return Err(ConfigError::Curve("need at least two control points".into()));
        }
        for point in curve {
            if !(point.pixels_per_day.is_finite() && point.pixels_per_day > 0.0) {
                return Err(ConfigError::Curve(format!(
                    "pixels_per_day must be positive at zoom {}",
                    point.zoom
                )));
            }
        }
        for pair in curve.windows(2) {
            if pair[1].zoom <= pair[0].zoom {
                return Err(ConfigError::Curve("zoom values must strictly ascend".into()));
            }
            if pair[1].pixels_per_day < pair[0].pixels_per_day {
                return Err(ConfigError::Curve(format!(
                    "pixels_per_day decreases between zoom {} and {}",
                    pair[0].zoom, pair[1].zoom
                )));
            }
        }

        for (name, value) in [("step", self.zoom.step), ("expand_nudge", self.zoom.expand_nudge)] {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(ConfigError::Curve(format!("{name} must lie in [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parse and validate a config file.
///
/// # Errors
///
/// Fails when the file cannot be read, parsed, or validated.
pub fn load_config_file(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<EngineConfig>(&content)
        .map_err(|e| ConfigError::Parse(e.to_string()))
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

/// Resolve the effective engine configuration.
///
/// Precedence: `<project_root>/.lifeline/config.toml`, then
/// `<config_dir>/lifeline/config.toml`, then built-in defaults.
///
/// # Errors
///
/// Fails when a config file exists but is unreadable or invalid.
pub fn load_engine_config(project_root: &Path) -> Result<EngineConfig> {
    let project = project_root.join(".lifeline/config.toml");
    if project.exists() {
        tracing::debug!(path = %project.display(), "using project config");
        return load_config_file(&project);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let user = config_dir.join("lifeline/config.toml");
        if user.exists() {
            tracing::debug!(path = %user.display(), "using user config");
            return load_config_file(&user);
        }
    }

    Ok(EngineConfig::default())
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_year_tier() -> TierConfig {
    TierConfig {
        gap_days: 30.0,
        distance_km: 500.0,
        bucket_days: 30.0,
    }
}

const fn default_month_tier() -> TierConfig {
    TierConfig {
        gap_days: 7.0,
        distance_km: 150.0,
        bucket_days: 7.0,
    }
}

const fn default_week_tier() -> TierConfig {
    TierConfig {
        gap_days: 2.0,
        distance_km: 40.0,
        bucket_days: 1.0,
    }
}

const fn default_day_tier() -> TierConfig {
    TierConfig {
        gap_days: 0.25,
        distance_km: 5.0,
        bucket_days: 0.25,
    }
}

const fn default_focus_tier() -> TierConfig {
    TierConfig {
        gap_days: 0.0,
        distance_km: 0.0,
        bucket_days: 1.0 / 24.0,
    }
}

const fn default_burst_min_size() -> usize {
    2
}

const fn default_burst_window_minutes() -> f64 {
    60.0
}

fn default_breakpoints() -> Vec<f64> {
    vec![0.2, 0.4, 0.6, 0.8]
}

const fn default_zoom_step() -> f64 {
    0.1
}

const fn default_expand_nudge() -> f64 {
    0.02
}

fn default_curve() -> Vec<CurvePoint> {
    [
        (0.0, 0.02),
        (0.2, 0.1),
        (0.4, 1.0),
        (0.6, 8.0),
        (0.8, 60.0),
        (1.0, 2_000.0),
    ]
    .into_iter()
    .map(|(zoom, pixels_per_day)| CurvePoint {
        zoom,
        pixels_per_day,
    })
    .collect()
}

const fn default_lookahead_fraction() -> f64 {
    0.5
}

const fn default_cache_entries() -> u64 {
    32
}

const fn default_debounce_ms() -> u64 {
    120
}

const fn default_min_node_px() -> f64 {
    4.0
}
