//! Detection records produced by the sequence matcher.

use super::Archetype;
use crate::paths::PathId;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

static NEXT_DETECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Which variant fired and over which instruction indices (inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub variant: String,
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for MatchSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} matched instructions {}..={}", self.variant, self.start, self.end)
    }
}

/// A single match record.
///
/// Detections have identity semantics: two structurally identical detections
/// are still distinct members of a [`DetectionSet`].
#[derive(Debug)]
pub struct Detection {
    id: u64,
    pub archetype: Arc<Archetype>,
    pub location: PathId,
    pub description: Option<String>,
    pub span: Option<MatchSpan>,
}

impl Detection {
    pub fn new(archetype: Arc<Archetype>, location: PathId, description: Option<String>) -> Self {
        Self {
            id: NEXT_DETECTION_ID.fetch_add(1, AtomicOrdering::Relaxed),
            archetype,
            location,
            description,
            span: None,
        }
    }

    /// Detection for a completed variant match; the description is derived from the span.
    pub fn for_match(archetype: Arc<Archetype>, location: PathId, span: MatchSpan) -> Self {
        let mut detection = Self::new(archetype, location, Some(span.to_string()));
        detection.span = Some(span);
        detection
    }

    /// Process-unique identity of this record.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Same detection (same identity) addressed through another path table.
    pub(crate) fn relocated(&self, location: PathId) -> Detection {
        Detection {
            id: self.id,
            archetype: Arc::clone(&self.archetype),
            location,
            description: self.description.clone(),
            span: self.span.clone(),
        }
    }
}

impl PartialEq for Detection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Detection {}

impl PartialOrd for Detection {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Detection {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// Identity-based set of detections, iterated in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionSet {
    items: BTreeSet<Arc<Detection>>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if this exact detection was already present.
    pub fn insert(&mut self, detection: Arc<Detection>) -> bool {
        self.items.insert(detection)
    }

    pub fn contains(&self, detection: &Detection) -> bool {
        self.items.contains(detection)
    }

    pub fn extend_from(&mut self, other: &DetectionSet) {
        self.items.extend(other.items.iter().cloned());
    }

    pub fn union(&self, other: &DetectionSet) -> DetectionSet {
        let mut merged = self.clone();
        merged.extend_from(other);
        merged
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Detection>> {
        self.items.iter()
    }
}

impl FromIterator<Arc<Detection>> for DetectionSet {
    fn from_iter<T: IntoIterator<Item = Arc<Detection>>>(iter: T) -> Self {
        Self { items: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Arc<Detection>;
    type IntoIter = std::collections::btree_set::Iter<'a, Arc<Detection>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
