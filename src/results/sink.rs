use super::aggregate::{ArchetypeHits, ScanResults};
use crate::paths::{PathId, PathTable};
use crate::types::Detection;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Accumulates detections for one scan.
pub trait ResultSink {
    /// Record a detection under its location and archetype.
    fn record(&mut self, detection: Arc<Detection>);

    /// Immutable, path-sorted view of everything recorded so far.
    fn finalize(&self) -> ScanResults;

    /// Table that recorded locations are interned in.
    fn paths(&self) -> &Arc<PathTable>;
}

/// Buckets detections by interned location handle, then archetype.
#[derive(Debug)]
pub struct DefaultSink {
    paths: Arc<PathTable>,
    buckets: FxHashMap<PathId, ArchetypeHits>,
}

impl DefaultSink {
    pub fn new(paths: Arc<PathTable>) -> Self {
        Self { paths, buckets: FxHashMap::default() }
    }

    pub fn detection_count(&self) -> usize {
        self.buckets
            .values()
            .flat_map(|hits| hits.values())
            .map(|set| set.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl ResultSink for DefaultSink {
    fn record(&mut self, detection: Arc<Detection>) {
        self.buckets
            .entry(detection.location)
            .or_default()
            .entry(Arc::clone(&detection.archetype))
            .or_default()
            .insert(detection);
    }

    fn finalize(&self) -> ScanResults {
        ScanResults::from_buckets(Arc::clone(&self.paths), self.buckets.clone())
    }

    fn paths(&self) -> &Arc<PathTable> {
        &self.paths
    }
}

/// Writes through to a delegate while keeping a private copy.
///
/// `finalize` returns only what was recorded through this sink; the delegate
/// still sees everything.
pub struct SplittingSink<'a, S: ResultSink + ?Sized> {
    delegate: &'a mut S,
    local: DefaultSink,
}

impl<'a, S: ResultSink + ?Sized> SplittingSink<'a, S> {
    /// The local copy interns into the delegate's table.
    pub fn new(delegate: &'a mut S) -> Self {
        let local = DefaultSink::new(Arc::clone(delegate.paths()));
        Self { delegate, local }
    }
}

impl<S: ResultSink + ?Sized> ResultSink for SplittingSink<'_, S> {
    fn record(&mut self, detection: Arc<Detection>) {
        self.delegate.record(Arc::clone(&detection));
        self.local.record(detection);
    }

    fn finalize(&self) -> ScanResults {
        self.local.finalize()
    }

    fn paths(&self) -> &Arc<PathTable> {
        self.local.paths()
    }
}
