//! Tests for archetypes and detections.

use super::*;
use crate::paths::PathTable;
use std::sync::Arc;

#[test]
fn test_suspicion_level_ordinals() {
    assert_eq!(SuspicionLevel::Maximum.ordinal(), 0);
    assert_eq!(SuspicionLevel::NothingBurger.ordinal(), 4);
    assert!(SuspicionLevel::Maximum.is_more_severe_than(SuspicionLevel::Strong));
    assert!(!SuspicionLevel::Weak.is_more_severe_than(SuspicionLevel::Medium));
    assert!(SuspicionLevel::Maximum < SuspicionLevel::Weak);
}

#[test]
fn test_suspicion_level_names() {
    for level in SuspicionLevel::ALL {
        assert_eq!(level.as_str().parse::<SuspicionLevel>().unwrap(), level);
    }
    assert!("HIGH".parse::<SuspicionLevel>().is_err());

    let json = serde_json::to_string(&SuspicionLevel::NothingBurger).unwrap();
    assert_eq!(json, "\"NOTHING_BURGER\"");
}

#[test]
fn test_archetype_equality_and_ordering() {
    let a = Archetype::new(SuspicionLevel::Strong, "alpha", "first");
    let a_other_desc = Archetype::new(SuspicionLevel::Strong, "alpha", "different text");
    let a_other_level = Archetype::new(SuspicionLevel::Weak, "alpha", "first");
    let b = Archetype::new(SuspicionLevel::Maximum, "beta", "second");

    assert_eq!(a, a_other_desc);
    assert_ne!(a, a_other_level);
    assert!(a < b, "ordering is by identifier before level");
}

#[test]
fn test_detections_have_identity() {
    let table = PathTable::new();
    let source = table.source("app.jar");
    let archetype = Arc::new(Archetype::new(SuspicionLevel::Medium, "x", "x"));

    let first = Arc::new(Detection::new(archetype.clone(), source, None));
    let second = Arc::new(Detection::new(archetype, source, None));
    assert_ne!(first.id(), second.id());

    let mut set = DetectionSet::new();
    assert!(set.insert(first.clone()));
    assert!(!set.insert(first.clone()));
    assert!(set.insert(second.clone()));
    assert_eq!(set.len(), 2);
    assert!(set.contains(&first));
}

#[test]
fn test_detection_for_match_describes_span() {
    let table = PathTable::new();
    let source = table.source("app.jar");
    let archetype = Arc::new(Archetype::new(SuspicionLevel::Medium, "x", "x"));
    let span = MatchSpan { variant: "exec".to_string(), start: 2, end: 5 };

    let detection = Detection::for_match(archetype, source, span.clone());
    assert_eq!(detection.description.as_deref(), Some("exec matched instructions 2..=5"));
    assert_eq!(detection.span, Some(span));
}

#[test]
fn test_detection_set_union() {
    let table = PathTable::new();
    let source = table.source("app.jar");
    let archetype = Arc::new(Archetype::new(SuspicionLevel::Medium, "x", "x"));
    let shared = Arc::new(Detection::new(archetype.clone(), source, None));
    let only_left = Arc::new(Detection::new(archetype.clone(), source, None));
    let only_right = Arc::new(Detection::new(archetype, source, None));

    let left: DetectionSet = [shared.clone(), only_left].into_iter().collect();
    let right: DetectionSet = [shared, only_right].into_iter().collect();

    let merged = left.union(&right);
    assert_eq!(merged.len(), 3);
    assert_eq!(merged.union(&merged), merged);
}
