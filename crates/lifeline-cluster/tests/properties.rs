use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use lifeline_cluster::{ClusterTree, TreeBuilder, verify_tree};
use lifeline_core::{DataVersion, Dataset, EngineConfig, Event, Normalizer, ZoomTier};
use lifeline_sim::{CorpusConfig, generate, shuffled};

fn build(events: Vec<Event>) -> ClusterTree {
    let dataset = Dataset::ingest(events, DataVersion::new(1), &Normalizer::default()).0;
    TreeBuilder::new(&EngineConfig::default()).build(Arc::new(dataset))
}

fn fingerprint(tree: &ClusterTree) -> Vec<(ZoomTier, Vec<String>)> {
    ZoomTier::ALL
        .into_iter()
        .map(|tier| {
            let mut ids: Vec<String> = tree
                .clusters(tier)
                .iter()
                .map(|c| c.id.as_str().to_string())
                .collect();
            ids.sort();
            (tier, ids)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_tier_partitions_the_events(seed in any::<u64>(), count in 1usize..400, years in 1u32..6) {
        let events = generate(&CorpusConfig::sized(count, years, seed));
        let tree = build(events);
        prop_assert_eq!(tree.event_count(), count);

        for tier in ZoomTier::ALL {
            let mut seen = HashSet::new();
            for cluster in tree.clusters(tier) {
                prop_assert!(!cluster.is_empty());
                for member in &cluster.members {
                    prop_assert!(seen.insert(member.clone()), "{} twice at {}", member, tier);
                }
            }
            prop_assert_eq!(seen.len(), count);
        }
    }

    #[test]
    fn finer_clusters_nest_in_exactly_one_parent(seed in any::<u64>(), count in 1usize..400) {
        let tree = build(generate(&CorpusConfig::sized(count, 3, seed)));
        let violations = verify_tree(&tree);
        prop_assert!(violations.is_empty(), "{:?}", violations);

        for tier in [ZoomTier::Month, ZoomTier::Week, ZoomTier::Day, ZoomTier::Focus] {
            for cluster in tree.clusters(tier) {
                let parent = tree.parent(cluster).expect("linked parent");
                for member in &cluster.members {
                    prop_assert!(parent.contains(member));
                }
            }
        }
    }

    #[test]
    fn input_order_does_not_matter(seed in any::<u64>(), shuffle in any::<u64>(), count in 1usize..300) {
        let events = generate(&CorpusConfig::sized(count, 2, seed));
        let ordered = build(events.clone());
        let mixed = build(shuffled(events, shuffle));
        prop_assert_eq!(fingerprint(&ordered), fingerprint(&mixed));
        prop_assert_eq!(ordered.fingerprint(), mixed.fingerprint());
    }
}
