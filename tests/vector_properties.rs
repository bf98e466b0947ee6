//! Property tests for string vectors

use proptest::prelude::*;
use rutil::{CVector, Vector};

proptest! {
    #[test]
    fn split_then_join_restores_input(s in "[a-c,]{0,40}") {
        let owned = Vector::split(&s, ',').unwrap();
        prop_assert_eq!(owned.join(",").unwrap(), s.clone());
        let fields = if s.is_empty() { 0 } else { s.matches(',').count() + 1 };
        prop_assert_eq!(owned.len(), fields);

        let borrowed = CVector::split(&s, ',').unwrap();
        prop_assert_eq!(borrowed.join(",").unwrap(), s.clone());
    }

    #[test]
    fn split_space_matches_whitespace_tokens(s in "[ab \t\n]{0,40}") {
        // Only spaces and tabs separate; a newline is an ordinary byte.
        let expected: Vec<&str> = s.split([' ', '\t']).filter(|t| !t.is_empty()).collect();

        let owned = Vector::split_space(&s).unwrap();
        prop_assert_eq!(owned.iter().collect::<Vec<_>>(), expected.clone());

        let borrowed = CVector::split_space(&s).unwrap();
        prop_assert_eq!(borrowed.as_slice(), expected.as_slice());
    }

    #[test]
    fn adds_are_counted_and_kept(items in prop::collection::vec("[a-z]{0,8}", 0..50)) {
        let mut vector = Vector::new();
        for item in &items {
            vector.add(item).unwrap();
        }
        prop_assert_eq!(vector.len(), items.len());
        prop_assert!(vector.capacity() >= vector.len());
        for (i, item) in items.iter().enumerate() {
            prop_assert_eq!(vector.get(i), Some(item.as_str()));
        }

        vector.clear();
        prop_assert!(vector.is_empty());
    }
}
