use std::fmt;

/// Machine-readable error codes shared by every lifeline crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidConfig,
    InvalidDate,
    InvalidLocation,
    DuplicateEventId,
    EmptyDataset,
    StaleTree,
    NestingViolation,
    RebuildCancelled,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidConfig => "E1002",
            Self::InvalidDate => "E2001",
            Self::InvalidLocation => "E2002",
            Self::DuplicateEventId => "E2003",
            Self::EmptyDataset => "E3001",
            Self::StaleTree => "E3002",
            Self::NestingViolation => "E3003",
            Self::RebuildCancelled => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidConfig => "Invalid engine configuration",
            Self::InvalidDate => "Malformed or out-of-range date",
            Self::InvalidLocation => "Coordinates out of range",
            Self::DuplicateEventId => "Duplicate event id in snapshot",
            Self::EmptyDataset => "Dataset has no events",
            Self::StaleTree => "Cluster tree older than requested data version",
            Self::NestingViolation => "Finer cluster straddled coarser clusters",
            Self::RebuildCancelled => "Rebuild superseded by a newer request",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .lifeline/config.toml and retry."),
            Self::InvalidConfig => {
                Some("Thresholds must shrink toward finer tiers and zoom curves must be monotonic.")
            }
            Self::InvalidDate => Some("Use YYYY-MM-DD, YYYY-MM, '<season> YYYY', YYYY or YYYYs."),
            Self::InvalidLocation => Some("Latitude must lie in [-90, 90], longitude in [-180, 180]."),
            Self::DuplicateEventId => Some("Event ids must be unique within one snapshot."),
            Self::EmptyDataset | Self::StaleTree | Self::RebuildCancelled => None,
            Self::NestingViolation => {
                Some("Check that coarser tiers use larger gap and distance thresholds.")
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidConfig,
            ErrorCode::InvalidDate,
            ErrorCode::InvalidLocation,
            ErrorCode::DuplicateEventId,
            ErrorCode::EmptyDataset,
            ErrorCode::StaleTree,
            ErrorCode::NestingViolation,
            ErrorCode::RebuildCancelled,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::NestingViolation.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }
}
