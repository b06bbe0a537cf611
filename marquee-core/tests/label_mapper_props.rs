use std::collections::HashSet;

use marquee_core::labels::{LabelMapper, LabelRules};
use proptest::prelude::*;

fn keyword() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 <>;'\"-]{0,40}",
        "\\PC{0,24}",
        Just("Escape".to_string()),
        Just("  time   travel ".to_string()),
    ]
}

fn keywords() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(keyword(), 0..80)
}

proptest! {
    #[test]
    fn mapping_is_deterministic(input in keywords()) {
        let mapper = LabelMapper::default();
        prop_assert_eq!(mapper.map(&input).unwrap(), mapper.map(&input).unwrap());
    }

    #[test]
    fn mapping_is_idempotent(input in keywords(), max_labels in 1usize..60) {
        let mapper = LabelMapper::new(LabelRules { max_labels, ..LabelRules::default() });
        let once = mapper.map(&input).unwrap();
        let twice = mapper.map(once.as_slice()).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn output_respects_invariants(input in keywords(), max_labels in 0usize..60) {
        let rules = LabelRules { max_labels, ..LabelRules::default() };
        let mapper = LabelMapper::new(rules.clone());
        let labels = mapper.map(&input).unwrap();

        prop_assert!(labels.len() <= max_labels);
        let mut seen = HashSet::new();
        for label in labels.iter() {
            prop_assert!(!label.trim().is_empty());
            prop_assert_eq!(label.trim(), label);
            prop_assert!(label.chars().count() <= rules.max_label_length);
            prop_assert!(!label.contains("  "));
            prop_assert!(seen.insert(label.to_string()), "duplicate label {}", label);
        }
    }
}

#[test]
fn empty_input_yields_empty_set() {
    let empty: Vec<String> = Vec::new();
    assert!(LabelMapper::default().map(&empty).unwrap().is_empty());
}
