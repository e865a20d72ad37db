//! Structural checks over a built tree.
//!
//! [`verify_tree`] returns every violation it finds rather than stopping at
//! the first, so the CLI can print a full report.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use lifeline_core::{EventId, ZoomTier};

use crate::cluster::ClusterId;
use crate::tree::ClusterTree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    EmptyCluster { tier: ZoomTier, cluster: ClusterId },
    MissingEvent { tier: ZoomTier, event: EventId },
    DuplicateEvent { tier: ZoomTier, event: EventId, clusters: Vec<ClusterId> },
    UnknownEvent { tier: ZoomTier, event: EventId, cluster: ClusterId },
    NotNested { tier: ZoomTier, cluster: ClusterId, parents: Vec<ClusterId> },
    BrokenLink { tier: ZoomTier, cluster: ClusterId },
    FocusNotSingleton { cluster: ClusterId, size: usize },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCluster { tier, cluster } => write!(f, "{tier}: cluster {cluster} is empty"),
            Self::MissingEvent { tier, event } => write!(f, "{tier}: event {event} is in no cluster"),
            Self::DuplicateEvent {
                tier,
                event,
                clusters,
            } => write!(f, "{tier}: event {event} appears in {} clusters", clusters.len()),
            Self::UnknownEvent {
                tier,
                event,
                cluster,
            } => write!(f, "{tier}: cluster {cluster} holds unknown event {event}"),
            Self::NotNested {
                tier,
                cluster,
                parents,
            } => write!(f, "{tier}: cluster {cluster} spans {} parents", parents.len()),
            Self::BrokenLink { tier, cluster } => {
                write!(f, "{tier}: cluster {cluster} has inconsistent parent/child links")
            }
            Self::FocusNotSingleton { cluster, size } => {
                write!(f, "focus: cluster {cluster} has {size} members")
            }
        }
    }
}

/// Check membership conservation, sibling disjointness, nesting and link
/// consistency at every tier.
#[must_use]
pub fn verify_tree(tree: &ClusterTree) -> Vec<Violation> {
    let dataset = tree.dataset();
    let mut violations = Vec::new();

    for tier in ZoomTier::ALL {
        let mut seen: HashMap<&EventId, Vec<&ClusterId>> = HashMap::new();
        for cluster in tree.clusters(tier) {
            if cluster.is_empty() {
                violations.push(Violation::EmptyCluster {
                    tier,
                    cluster: cluster.id.clone(),
                });
            }
            if tier == ZoomTier::Focus && cluster.len() != 1 {
                violations.push(Violation::FocusNotSingleton {
                    cluster: cluster.id.clone(),
                    size: cluster.len(),
                });
            }
            for member in &cluster.members {
                if dataset.get(member).is_none() {
                    violations.push(Violation::UnknownEvent {
                        tier,
                        event: member.clone(),
                        cluster: cluster.id.clone(),
                    });
                }
                seen.entry(member).or_default().push(&cluster.id);
            }
        }

        for event in dataset.events() {
            match seen.get(event.id()) {
                None => violations.push(Violation::MissingEvent {
                    tier,
                    event: event.id().clone(),
                }),
                Some(owners) if owners.len() > 1 => violations.push(Violation::DuplicateEvent {
                    tier,
                    event: event.id().clone(),
                    clusters: owners.iter().map(|&id| id.clone()).collect(),
                }),
                Some(_) => {}
            }
        }

        if let Some(coarser) = tier.coarser() {
            check_nesting(tree, tier, coarser, &mut violations);
        }
    }
    violations
}

fn check_nesting(tree: &ClusterTree, tier: ZoomTier, coarser: ZoomTier, out: &mut Vec<Violation>) {
    let parent_level = tree.level(coarser);
    for (idx, cluster) in tree.clusters(tier).iter().enumerate() {
        let mut parents: Vec<usize> = cluster
            .positions
            .iter()
            .filter_map(|&pos| parent_level.owner_of(pos))
            .collect();
        parents.sort_unstable();
        parents.dedup();

        if parents.len() != 1 {
            out.push(Violation::NotNested {
                tier,
                cluster: cluster.id.clone(),
                parents: parents
                    .iter()
                    .filter_map(|&p| parent_level.clusters().get(p).map(|c| c.id.clone()))
                    .collect(),
            });
            continue;
        }

        let linked = cluster.parent == Some(parents[0])
            && parent_level
                .clusters()
                .get(parents[0])
                .is_some_and(|p| p.children.contains(&idx));
        if !linked {
            out.push(Violation::BrokenLink {
                tier,
                cluster: cluster.id.clone(),
            });
        }
    }
}
