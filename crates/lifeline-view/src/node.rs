//! Render nodes: the minimal units handed to the rendering layer.

use chrono::{DateTime, Utc};
use serde::Serialize;

use lifeline_cluster::{ClusterId, ClusterType};
use lifeline_core::{EventId, GeoPoint, TimeRange, ZoomTier};

/// Placement hint in absolute timeline pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Geometry {
    pub x_px: f64,
    pub width_px: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventNode {
    pub id: EventId,
    pub display_instant: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_location: Option<GeoPoint>,
    pub kind: String,
    pub private: bool,
    pub geometry: Geometry,
    /// Emitted in place of a manually expanded cluster.
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterNode {
    pub id: ClusterId,
    pub tier: ZoomTier,
    pub display_instant: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_location: Option<GeoPoint>,
    pub weight: usize,
    pub span: TimeRange,
    pub cluster_type: ClusterType,
    pub confidence: f64,
    pub burst: bool,
    pub geometry: Geometry,
    /// Emitted in place of a manually expanded cluster.
    pub expanded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "lowercase")]
pub enum RenderNode {
    Event(EventNode),
    Cluster(ClusterNode),
}

impl RenderNode {
    #[must_use]
    pub const fn display_instant(&self) -> DateTime<Utc> {
        match self {
            Self::Event(node) => node.display_instant,
            Self::Cluster(node) => node.display_instant,
        }
    }

    #[must_use]
    pub const fn display_location(&self) -> Option<GeoPoint> {
        match self {
            Self::Event(node) => node.display_location,
            Self::Cluster(node) => node.display_location,
        }
    }

    /// Number of events represented.
    #[must_use]
    pub const fn weight(&self) -> usize {
        match self {
            Self::Event(_) => 1,
            Self::Cluster(node) => node.weight,
        }
    }

    #[must_use]
    pub const fn geometry(&self) -> Geometry {
        match self {
            Self::Event(node) => node.geometry,
            Self::Cluster(node) => node.geometry,
        }
    }

    #[must_use]
    pub const fn expanded(&self) -> bool {
        match self {
            Self::Event(node) => node.expanded,
            Self::Cluster(node) => node.expanded,
        }
    }

    /// Event id or cluster id, as text.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Event(node) => node.id.as_str(),
            Self::Cluster(node) => node.id.as_str(),
        }
    }

    #[must_use]
    pub const fn as_cluster(&self) -> Option<&ClusterNode> {
        match self {
            Self::Cluster(node) => Some(node),
            Self::Event(_) => None,
        }
    }
}
