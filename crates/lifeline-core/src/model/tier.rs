use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Discrete granularity at which clustering and rendering are evaluated.
///
/// Variants are declared coarsest first, so the derived ordering reads
/// `Year < Month < Week < Day < Focus` in the "finer than" sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomTier {
    Year,
    Month,
    Week,
    Day,
    Focus,
}

impl ZoomTier {
    /// All tiers, coarsest to finest.
    pub const ALL: [Self; 5] = [Self::Year, Self::Month, Self::Week, Self::Day, Self::Focus];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Focus => "focus",
        }
    }

    /// Position in [`ZoomTier::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Year => 0,
            Self::Month => 1,
            Self::Week => 2,
            Self::Day => 3,
            Self::Focus => 4,
        }
    }

    /// The next finer tier, or `None` at `Focus`.
    #[must_use]
    pub const fn finer(self) -> Option<Self> {
        match self {
            Self::Year => Some(Self::Month),
            Self::Month => Some(Self::Week),
            Self::Week => Some(Self::Day),
            Self::Day => Some(Self::Focus),
            Self::Focus => None,
        }
    }

    /// The next coarser tier, or `None` at `Year`.
    #[must_use]
    pub const fn coarser(self) -> Option<Self> {
        match self {
            Self::Year => None,
            Self::Month => Some(Self::Year),
            Self::Week => Some(Self::Month),
            Self::Day => Some(Self::Week),
            Self::Focus => Some(Self::Day),
        }
    }
}

impl fmt::Display for ZoomTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown zoom tier {0:?} (expected year, month, week, day or focus)")]
pub struct ParseTierError(pub String);

impl FromStr for ZoomTier {
    type Err = ParseTierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseTierError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finer_and_coarser_walk_the_ladder() {
        let mut tier = ZoomTier::Year;
        let mut seen = vec![tier];
        while let Some(next) = tier.finer() {
            assert_eq!(next.coarser(), Some(tier));
            tier = next;
            seen.push(tier);
        }
        assert_eq!(seen, ZoomTier::ALL.to_vec());
    }

    #[test]
    fn index_matches_position() {
        for (i, tier) in ZoomTier::ALL.into_iter().enumerate() {
            assert_eq!(tier.index(), i);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Week".parse::<ZoomTier>(), Ok(ZoomTier::Week));
        assert!("hour".parse::<ZoomTier>().is_err());
    }
}
