use crate::paths::{PathId, PathTable};
use crate::types::{Archetype, Detection, DetectionSet, SuspicionLevel};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Detections at one location, grouped by archetype.
pub type ArchetypeHits = BTreeMap<Arc<Archetype>, DetectionSet>;

/// Immutable scan outcome: location → archetype → detections, sorted by the
/// location's display string.
#[derive(Debug, Clone)]
pub struct ScanResults {
    paths: Arc<PathTable>,
    entries: Vec<(PathId, ArchetypeHits)>,
}

impl ScanResults {
    pub fn empty(paths: Arc<PathTable>) -> Self {
        Self { paths, entries: Vec::new() }
    }

    pub(crate) fn from_buckets(paths: Arc<PathTable>, buckets: FxHashMap<PathId, ArchetypeHits>) -> Self {
        let mut entries: Vec<_> = buckets
            .into_iter()
            .filter(|(_, hits)| hits.values().any(|set| !set.is_empty()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| paths.compare(*a, *b));
        Self { paths, entries }
    }

    /// Table the locations in this aggregate are interned in.
    pub fn paths(&self) -> &Arc<PathTable> {
        &self.paths
    }

    /// Number of locations with at least one detection.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn detection_count(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|(_, hits)| hits.values())
            .map(DetectionSet::len)
            .sum()
    }

    pub fn get(&self, path: PathId) -> Option<&ArchetypeHits> {
        self.entries
            .binary_search_by(|(candidate, _)| self.paths.compare(*candidate, path))
            .ok()
            .map(|index| &self.entries[index].1)
    }

    pub fn detections_at(&self, path: PathId, archetype: &Archetype) -> Option<&DetectionSet> {
        self.get(path)?.get(archetype)
    }

    /// Locations in display order.
    pub fn iter(&self) -> impl Iterator<Item = (PathId, &ArchetypeHits)> {
        self.entries.iter().map(|(path, hits)| (*path, hits))
    }

    pub fn detections(&self) -> impl Iterator<Item = &Arc<Detection>> {
        self.entries
            .iter()
            .flat_map(|(_, hits)| hits.values())
            .flat_map(DetectionSet::iter)
    }

    /// Every archetype that fired at least once.
    pub fn archetypes(&self) -> BTreeSet<Arc<Archetype>> {
        self.entries
            .iter()
            .flat_map(|(_, hits)| hits.keys().cloned())
            .collect()
    }

    /// Most severe level among the archetypes that fired.
    pub fn highest_level(&self) -> Option<SuspicionLevel> {
        self.entries
            .iter()
            .flat_map(|(_, hits)| hits.keys())
            .map(|archetype| archetype.level)
            .min()
    }

    /// Union per (location, archetype). Locations from a different table are
    /// re-interned into this one.
    pub fn merge(&self, other: &ScanResults) -> ScanResults {
        let mut buckets: FxHashMap<PathId, ArchetypeHits> = self.entries.iter().cloned().collect();
        let foreign = !Arc::ptr_eq(&self.paths, &other.paths);
        for (path, hits) in &other.entries {
            let Some(path) = self.paths.import(&other.paths, *path) else {
                continue;
            };
            let target = buckets.entry(path).or_default();
            for (archetype, set) in hits {
                let merged = target.entry(Arc::clone(archetype)).or_default();
                if !foreign {
                    merged.extend_from(set);
                    continue;
                }
                for detection in set {
                    merged.insert(self.relocate(&other.paths, detection, path));
                }
            }
        }
        Self::from_buckets(Arc::clone(&self.paths), buckets)
    }

    /// Re-address a detection from `foreign` into this aggregate's table.
    fn relocate(&self, foreign: &PathTable, detection: &Arc<Detection>, fallback: PathId) -> Arc<Detection> {
        let location = self.paths.import(foreign, detection.location).unwrap_or(fallback);
        Arc::new(detection.relocated(location))
    }

    /// Roll method-level detections up to their classes.
    pub fn by_class(&self) -> ScanResults {
        self.roll_up(|paths, path| paths.class_of(path))
    }

    /// Roll detections up to their sources.
    pub fn by_source(&self) -> ScanResults {
        self.roll_up(|paths, path| paths.source_of(path))
    }

    fn roll_up(&self, ancestor: impl Fn(&PathTable, PathId) -> Option<PathId>) -> ScanResults {
        let mut buckets: FxHashMap<PathId, ArchetypeHits> = FxHashMap::default();
        for (path, hits) in &self.entries {
            let key = ancestor(&self.paths, *path).unwrap_or(*path);
            let target = buckets.entry(key).or_default();
            for (archetype, set) in hits {
                target.entry(Arc::clone(archetype)).or_default().extend_from(set);
            }
        }
        Self::from_buckets(Arc::clone(&self.paths), buckets)
    }
}

impl PartialEq for ScanResults {
    /// Same locations (by display), same archetypes, same detection identities.
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().zip(&other.entries).all(|((a, ha), (b, hb))| {
                self.paths.display(*a) == other.paths.display(*b) && ha == hb
            })
    }
}
