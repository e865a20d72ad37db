use proptest::prelude::*;

use lifeline_core::{DataVersion, Dataset, Normalizer};
use lifeline_sim::{CorpusConfig, generate};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_generated_event_normalizes(seed in any::<u64>(), count in 0usize..500, years in 1u32..30) {
        let events = generate(&CorpusConfig::sized(count, years, seed));
        prop_assert_eq!(events.len(), count);

        let (dataset, report) = Dataset::ingest(events, DataVersion::new(1), &Normalizer::default());
        prop_assert!(report.is_clean(), "{:?}", report.rejected);
        prop_assert_eq!(dataset.len(), count);
    }
}
